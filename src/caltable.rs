// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading solutions back out of calibration tables.
//!
//! Table formats belong to the external solvers; `calpipe` only needs the
//! solutions as rows.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One solution from a gain table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalTableRow {
    pub antenna: u32,
    pub spw: u32,
    /// The solution time [s].
    pub time: f64,
    /// The gain amplitude.
    pub amplitude: f64,
    #[serde(default)]
    pub flagged: bool,
}

pub trait CalTableReader {
    fn read(&self, table: &Path) -> Result<Vec<CalTableRow>, CalTableError>;
}

#[derive(Error, Debug)]
pub enum CalTableError {
    #[error("Couldn't read calibration table '{}': {reason}", table.display())]
    Read { table: PathBuf, reason: String },
}
