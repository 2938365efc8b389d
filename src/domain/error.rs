// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("A measurement set called '{0}' is already part of this observing run")]
    Duplicate(String),

    #[error("No measurement set called '{0}' is part of this observing run")]
    NoMsWithName(String),

    #[error("No measurement set with intent '{0}' is part of this observing run")]
    NoMsWithIntent(String),

    #[error("Neither a measurement set name nor an intent was given")]
    NoIdentifier,
}
