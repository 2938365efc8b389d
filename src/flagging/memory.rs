// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Views held in memory, flagged by flagdata jobs applied in memory.

use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;
use log::trace;

use super::{FlagCommand, ImageView, ViewResults};
use crate::tasks::{Executor, JobArg, JobError, JobRequest, JobRunner, Task, TaskError};

/// Views keyed by their description. Clones share the same views.
#[derive(Debug, Clone, Default)]
pub struct ViewStore(Rc<RefCell<IndexMap<String, ImageView>>>);

impl ViewStore {
    pub fn new() -> ViewStore {
        ViewStore::default()
    }

    pub fn insert(&self, view: ImageView) {
        self.0.borrow_mut().insert(view.description(), view);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn views(&self) -> Vec<ImageView> {
        self.0.borrow().values().cloned().collect()
    }

    /// Apply a flag command to the views of `table` that it targets,
    /// returning the number of newly-flagged cells.
    pub fn apply(&self, table: &str, cmd: &FlagCommand) -> usize {
        self.0
            .borrow_mut()
            .values_mut()
            .filter(|view| view.filename() == table)
            .map(|view| view.apply_flag_command(cmd))
            .sum()
    }
}

/// A view task that reads the views out of a [`ViewStore`].
pub struct StoredViews {
    store: ViewStore,
}

impl StoredViews {
    pub fn new(store: ViewStore) -> StoredViews {
        StoredViews { store }
    }
}

impl Task for StoredViews {
    type Results = ViewResults;

    fn name(&self) -> &'static str {
        "storedviews"
    }

    fn prepare(&mut self, _: &mut Executor) -> Result<ViewResults, TaskError> {
        let mut results = ViewResults::new(self.name());
        for view in self.store.views() {
            results.add_view(view);
        }
        Ok(results)
    }
}

/// Runs list-mode flagdata jobs against a [`ViewStore`]. A job only touches
/// the views computed from its `vis`. No other jobs are supported.
pub struct ViewStoreRunner {
    store: ViewStore,
}

impl ViewStoreRunner {
    pub fn new(store: ViewStore) -> ViewStoreRunner {
        ViewStoreRunner { store }
    }
}

impl JobRunner for ViewStoreRunner {
    fn run(&mut self, job: &JobRequest) -> Result<Option<String>, JobError> {
        let (table, cmds) = match (job.task(), job.get_str("vis"), job.get("inpfile")) {
            ("flagdata", Some(table), Some(JobArg::List(cmds))) => (table, cmds),
            _ => return Err(JobError::Unsupported(job.to_string())),
        };

        let mut num_flagged = 0;
        for cmd in cmds {
            let cmd: FlagCommand = cmd.parse().map_err(|e: super::ViewError| JobError::Failed {
                job: job.task().to_string(),
                reason: e.to_string(),
            })?;
            let n = self.store.apply(table, &cmd);
            trace!("{table}: {cmd} flagged {n} cell(s)");
            num_flagged += n;
        }
        Ok(Some(format!("Flagged {num_flagged} cell(s) in {table}")))
    }
}
