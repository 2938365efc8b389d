// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalLibraryError {
    /// A calibration application refers to a table that isn't on storage.
    #[error("Calibration table '{}' does not exist; refusing to activate {calto}", table.display())]
    NotFound { table: PathBuf, calto: String },
}
