// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Existence checks against the storage holding calibration tables and
//! measurement sets.

use std::path::Path;

/// Something that can say whether a table exists. Calibration tables are
/// written by external solvers; `calpipe` only ever asks whether they're
/// there.
pub trait Storage {
    fn exists(&self, path: &Path) -> bool;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl Storage for FileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Used during dry runs; every table "will exist".
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AssumeExists;

impl Storage for AssumeExists {
    fn exists(&self, _: &Path) -> bool {
        true
    }
}
