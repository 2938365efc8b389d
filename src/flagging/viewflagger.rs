// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag data by repeatedly computing views of it, flagging what the rules
//! don't like, and recomputing the views from the newly-flagged data.

use std::sync::Arc;

use crossbeam_utils::atomic::AtomicCell;
use indexmap::IndexMap;
use log::{debug, info};
use serde::Serialize;
use strum_macros::Display;

use super::{
    flagcmd::commands_from_violations, rules::Violations, FlagCommand, FlagRule, FlagSetter,
    ImageView, ViewResults,
};
use crate::{
    qa::QAScorePool,
    tasks::{Executor, InputsError, Task, TaskError, TaskResults},
};

/// Lets another thread stop an iterative flagger between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicCell<bool>>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// No rule wanted anything else flagged.
    Converged,
    /// Flags were applied as many times as allowed.
    IterationLimit,
    Cancelled,
}

/// A view as it was last seen, and every command generated for it.
#[derive(Debug, Clone)]
pub struct FlaggedView {
    pub view: ImageView,
    pub commands: Vec<FlagCommand>,
}

#[derive(Debug)]
pub struct ViewFlaggerResults {
    task: &'static str,
    pub views: IndexMap<String, FlaggedView>,
    /// The number of times views were computed.
    pub iterations: u32,
    pub converged: bool,
    pub stop_reason: StopReason,
    pub niter: u32,
    qa: QAScorePool,
}

impl ViewFlaggerResults {
    /// All commands, in the order they were generated.
    pub fn commands(&self) -> impl Iterator<Item = &FlagCommand> {
        self.views.values().flat_map(|v| v.commands.iter())
    }

    pub fn num_commands(&self) -> usize {
        self.views.values().map(|v| v.commands.len()).sum()
    }
}

impl TaskResults for ViewFlaggerResults {
    fn task_name(&self) -> &str {
        self.task
    }

    fn qa(&self) -> &QAScorePool {
        &self.qa
    }

    fn qa_mut(&mut self) -> &mut QAScorePool {
        &mut self.qa
    }
}

/// Evaluate `rules` in order against `view`, flagging the view as it goes so
/// that later rules don't see what earlier rules flagged.
pub(crate) fn evaluate_rules(view: &mut ImageView, rules: &[FlagRule]) -> Vec<FlagCommand> {
    let mut commands = vec![];
    for rule in rules {
        let violations = rule.evaluate(view.data(), view.flag());
        if violations.is_empty() {
            continue;
        }
        let new = commands_from_violations(view, rule, &violations);
        debug!(
            "Rule {} generated {} flag command(s) for {}",
            rule.name(),
            new.len(),
            view.description()
        );

        let (num_rows, num_cols) = view.data().dim();
        match violations {
            Violations::Cells(cells) => {
                for (i_row, i_col) in cells {
                    view.set_flag(i_row, i_col);
                }
            }
            Violations::Rows(rows) => {
                for i_row in rows {
                    for i_col in 0..num_cols {
                        view.set_flag(i_row, i_col);
                    }
                }
            }
            Violations::Columns(cols) => {
                for i_col in cols {
                    for i_row in 0..num_rows {
                        view.set_flag(i_row, i_col);
                    }
                }
            }
        }
        commands.extend(new);
    }
    commands
}

pub struct IterativeViewFlagger<V, S> {
    name: &'static str,
    view_task: V,
    flag_setter: S,
    rules: Vec<FlagRule>,
    niter: u32,
    cancel: CancelToken,
}

impl<V, S> IterativeViewFlagger<V, S>
where
    V: Task<Results = ViewResults>,
    S: FlagSetter,
{
    /// `niter` is the most times flags will be applied; it must be at least 1.
    pub fn new(
        view_task: V,
        flag_setter: S,
        rules: Vec<FlagRule>,
        niter: u32,
    ) -> Result<Self, InputsError> {
        if niter == 0 {
            return Err(InputsError::Invalid {
                name: "niter",
                value: niter.to_string(),
                reason: "at least one iteration is needed".to_string(),
            });
        }
        Ok(IterativeViewFlagger {
            name: "viewflagger",
            view_task,
            flag_setter,
            rules,
            niter,
            cancel: CancelToken::default(),
        })
    }

    /// Attribute results to a different task name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn rules(&self) -> &[FlagRule] {
        &self.rules
    }

    pub fn view_task(&self) -> &V {
        &self.view_task
    }
}

impl<V, S> Task for IterativeViewFlagger<V, S>
where
    V: Task<Results = ViewResults>,
    S: FlagSetter,
{
    type Results = ViewFlaggerResults;

    fn name(&self) -> &'static str {
        self.name
    }

    fn prepare(&mut self, executor: &mut Executor) -> Result<ViewFlaggerResults, TaskError> {
        let mut flagged: IndexMap<String, FlaggedView> = IndexMap::new();
        let mut iterations = 0;
        let mut num_applied = 0;

        let stop_reason = loop {
            if self.cancel.is_cancelled() {
                info!("{}: cancelled after {iterations} iteration(s)", self.name);
                break StopReason::Cancelled;
            }

            let views = executor.execute(&mut self.view_task, false)?.into_views();
            iterations += 1;

            let mut new_commands = vec![];
            for (key, mut view) in views {
                // Flags never go away.
                if let Some(previous) = flagged.get(&key) {
                    view.merge_flags(&previous.view);
                }
                let commands = evaluate_rules(&mut view, &self.rules);
                new_commands.extend(commands.iter().cloned());
                match flagged.get_mut(&key) {
                    Some(entry) => {
                        entry.view = view;
                        entry.commands.extend(commands);
                    }
                    None => {
                        flagged.insert(key, FlaggedView { view, commands });
                    }
                }
            }

            if new_commands.is_empty() {
                debug!("{}: converged after {iterations} iteration(s)", self.name);
                break StopReason::Converged;
            }

            info!(
                "{}: iteration {iterations} produced {} flag command(s)",
                self.name,
                new_commands.len()
            );
            self.flag_setter.flags_to_set(new_commands);
            executor.execute(&mut self.flag_setter, false)?;
            num_applied += 1;
            if num_applied >= self.niter {
                info!(
                    "{}: stopping after {} iteration(s) without converging",
                    self.name, self.niter
                );
                break StopReason::IterationLimit;
            }
        };

        Ok(ViewFlaggerResults {
            task: self.name,
            views: flagged,
            iterations,
            converged: stop_reason == StopReason::Converged,
            stop_reason,
            niter: self.niter,
            qa: QAScorePool::default(),
        })
    }
}
