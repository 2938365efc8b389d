// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Building blocks for interferometric data reduction pipelines: a calibration
library that resolves which tables apply to which data, a task execution
template with QA-gated merging into a shared context, a registry of QA
handlers, and an iterative view flagger.
 */

pub mod callibrary;
pub mod caltable;
mod cli;
pub mod constants;
pub mod context;
pub mod domain;
pub mod flagging;
pub mod qa;
pub mod stages;
pub mod storage;
pub mod tasks;

#[cfg(test)]
mod tests;

// Re-exports.
pub use callibrary::{CalApplication, CalFrom, CalLibrary, CalTo, CalType, OverridePolicy};
pub use cli::{Calpipe, CalpipeError};
pub use context::Context;
pub use tasks::{Executor, Task, TaskResults};
