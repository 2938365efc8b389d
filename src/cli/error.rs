// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all calpipe-related errors. This should be the *only* error
//! enum that is publicly visible from the binary.

use thiserror::Error;

use crate::{
    callibrary::CalLibraryError,
    caltable::CalTableError,
    domain::CatalogError,
    flagging::ViewError,
    tasks::{InputsError, JobError, TaskError},
};

/// The *only* publicly visible error from the calpipe binary. Each variant
/// names the part of the pipeline that went wrong, unless it's "generic".
#[derive(Error, Debug)]
pub enum CalpipeError {
    /// An error related to the calibration library.
    #[error("{0}\n\nCalibration applications are activated only when all of their tables exist.")]
    CalLibrary(String),

    /// An error related to the observing-run catalog.
    #[error("{0}\n\nMeasurement sets are identified by their basename or by an intent.")]
    Catalog(String),

    /// Bad task or subcommand inputs.
    #[error("{0}")]
    Inputs(String),

    /// An external job failed.
    #[error("{0}\n\nTry turning up verbosity (-v or -vv) to see the job that failed.")]
    Job(String),

    /// A task's outputs didn't verify.
    #[error("{0}")]
    Task(String),

    /// An error related to views or flag commands.
    #[error("{0}\n\nView data and flags must be rectangular and share a shape with the view's axes.")]
    Flagging(String),

    /// An error related to reading calibration tables.
    #[error("{0}")]
    CalTable(String),

    /// An error related to argument files.
    #[error("{0}\n\nArgument files may be TOML or JSON; any CLI arguments override those in the file.")]
    ArgFile(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<CalLibraryError> for CalpipeError {
    fn from(e: CalLibraryError) -> Self {
        Self::CalLibrary(e.to_string())
    }
}

impl From<CatalogError> for CalpipeError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e.to_string())
    }
}

impl From<InputsError> for CalpipeError {
    fn from(e: InputsError) -> Self {
        let s = e.to_string();
        match e {
            InputsError::Missing(_) | InputsError::Invalid { .. } => Self::Inputs(s),
            InputsError::Catalog(e) => Self::from(e),
        }
    }
}

impl From<JobError> for CalpipeError {
    fn from(e: JobError) -> Self {
        Self::Job(e.to_string())
    }
}

impl From<ViewError> for CalpipeError {
    fn from(e: ViewError) -> Self {
        Self::Flagging(e.to_string())
    }
}

impl From<CalTableError> for CalpipeError {
    fn from(e: CalTableError) -> Self {
        Self::CalTable(e.to_string())
    }
}

impl From<TaskError> for CalpipeError {
    fn from(e: TaskError) -> Self {
        let s = e.to_string();
        match e {
            TaskError::Inputs(e) => Self::from(e),
            TaskError::Job(e) => Self::from(e),
            TaskError::CalLibrary(e) => Self::from(e),
            TaskError::Catalog(e) => Self::from(e),
            TaskError::CalTable(e) => Self::from(e),
            TaskError::View(e) => Self::from(e),
            TaskError::Verification { .. } => Self::Task(s),
        }
    }
}

impl From<std::io::Error> for CalpipeError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<serde_json::Error> for CalpipeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<toml::ser::Error> for CalpipeError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
