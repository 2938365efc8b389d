// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("The {what} of view '{view}' has shape {got:?}, but {expected:?} was expected")]
    ShapeMismatch {
        view: String,
        what: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("The {what} of view '{view}' has rows of different lengths")]
    Ragged { view: String, what: &'static str },

    #[error("Couldn't parse flag command \"{cmd}\": {reason}")]
    BadFlagCommand { cmd: String, reason: String },
}
