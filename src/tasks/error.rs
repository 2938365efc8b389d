// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{
    callibrary::CalLibraryError, caltable::CalTableError, domain::CatalogError,
    flagging::ViewError,
};

/// Errors from turning task arguments into task parameters.
#[derive(Error, Debug)]
pub enum InputsError {
    #[error("No value was given for '{0}', and none could be inferred")]
    Missing(&'static str),

    #[error("Invalid value '{value}' for '{name}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job {job} failed: {reason}")]
    Failed { job: String, reason: String },

    #[error("No runner knows how to execute job {0}")]
    Unsupported(String),
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Inputs(#[from] InputsError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    CalLibrary(#[from] CalLibraryError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    CalTable(#[from] CalTableError),

    #[error(transparent)]
    View(#[from] ViewError),

    /// The outputs of a task weren't what they should have been.
    #[error("{task}: {reason}")]
    Verification { task: &'static str, reason: String },
}
