// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The task execution template.
//!
//! A [`Task`] runs in two phases: `prepare` builds and submits the external
//! jobs it needs, and `analyse` inspects what those jobs left behind. Tasks
//! never touch the pipeline [`Context`] themselves; the [`Executor`] runs QA
//! on their results and, if asked to and QA is happy, lets the results merge
//! themselves into the context.

mod error;
mod executor;
mod inputs;
#[cfg(test)]
mod tests;

pub use error::{InputsError, JobError, TaskError};
pub use executor::{Executor, JobArg, JobRequest, JobResult, JobRunner};
pub use inputs::{format_ids, parse_ids, split_csv, strip_intent_wildcards};

use std::any::Any;
use std::fmt;

use crate::{
    callibrary::CalApplication, context::Context, qa::QAScorePool, storage::Storage,
};

pub trait Task {
    type Results: TaskResults;

    /// The name results are attributed to.
    fn name(&self) -> &'static str;

    /// Build and submit the jobs this task needs.
    fn prepare(&mut self, executor: &mut Executor) -> Result<Self::Results, TaskError>;

    /// Verify and post-process what `prepare` produced.
    fn analyse(
        &mut self,
        results: Self::Results,
        _executor: &mut Executor,
    ) -> Result<Self::Results, TaskError> {
        Ok(results)
    }
}

/// Lets a results trait object be downcast to its concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub trait TaskResults: AsAny + fmt::Debug + 'static {
    /// The name of the task that produced these results.
    fn task_name(&self) -> &str;

    fn qa(&self) -> &QAScorePool;

    fn qa_mut(&mut self) -> &mut QAScorePool;

    /// Results of sub-tasks, for results that are lists.
    fn children_mut(&mut self) -> Option<&mut [Box<dyn TaskResults>]> {
        None
    }

    /// Fold these results into the pipeline state. Only called by the
    /// [`Executor`], after QA has accepted the results.
    fn merge_with_context(
        &self,
        _context: &mut Context,
        _storage: &dyn Storage,
    ) -> Result<(), TaskError> {
        Ok(())
    }
}

/// The results of several tasks, e.g. one per measurement set.
#[derive(Debug, Default)]
pub struct ResultsList {
    task: String,
    items: Vec<Box<dyn TaskResults>>,
    qa: QAScorePool,
}

impl ResultsList {
    pub fn new(task: &str) -> ResultsList {
        ResultsList {
            task: task.to_string(),
            items: vec![],
            qa: QAScorePool::default(),
        }
    }

    pub fn push<R: TaskResults>(&mut self, result: R) {
        self.items.push(Box::new(result));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn TaskResults> {
        self.items.iter().map(|r| &**r)
    }
}

impl TaskResults for ResultsList {
    fn task_name(&self) -> &str {
        &self.task
    }

    fn qa(&self) -> &QAScorePool {
        &self.qa
    }

    fn qa_mut(&mut self) -> &mut QAScorePool {
        &mut self.qa
    }

    fn children_mut(&mut self) -> Option<&mut [Box<dyn TaskResults>]> {
        Some(&mut self.items)
    }

    fn merge_with_context(
        &self,
        context: &mut Context,
        storage: &dyn Storage,
    ) -> Result<(), TaskError> {
        for item in &self.items {
            item.merge_with_context(context, storage)?;
        }
        Ok(())
    }
}

/// The calibration applications a task proposed, split into those whose
/// tables were produced and those whose weren't.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalAppPool {
    pool: Vec<CalApplication>,
    accepted: Vec<CalApplication>,
    errors: Vec<CalApplication>,
}

impl CalAppPool {
    pub fn push(&mut self, calapp: CalApplication) {
        self.pool.push(calapp);
    }

    /// Every proposed application.
    pub fn pool(&self) -> &[CalApplication] {
        &self.pool
    }

    /// The applications to be merged into the context.
    pub fn accepted(&self) -> &[CalApplication] {
        &self.accepted
    }

    /// The applications whose tables are missing.
    pub fn errors(&self) -> &[CalApplication] {
        &self.errors
    }

    /// Sort the pool into accepted and failed applications according to
    /// whether their tables exist.
    pub fn verify(&mut self, storage: &dyn Storage) {
        let (accepted, errors): (Vec<_>, Vec<_>) = self
            .pool
            .iter()
            .cloned()
            .partition(|c: &CalApplication| c.exists(storage));
        self.accepted = accepted;
        self.errors = errors;
    }

    /// Don't merge anything; used when the applications failed QA.
    pub fn reject(&mut self) {
        self.accepted.clear();
    }
}
