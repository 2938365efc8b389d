// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Running tasks, and the external jobs they submit.

use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use super::{JobError, Task, TaskError, TaskResults};
use crate::{
    context::{Context, MergeOutcome, StageSummary},
    qa::{QaGate, QaRegistry},
    storage::{AssumeExists, Storage},
};

/// A single argument of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobArg {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<String>),
}

impl From<&str> for JobArg {
    fn from(s: &str) -> Self {
        JobArg::Str(s.to_string())
    }
}

impl From<String> for JobArg {
    fn from(s: String) -> Self {
        JobArg::Str(s)
    }
}

impl From<bool> for JobArg {
    fn from(b: bool) -> Self {
        JobArg::Bool(b)
    }
}

impl From<i64> for JobArg {
    fn from(i: i64) -> Self {
        JobArg::Int(i)
    }
}

impl From<f64> for JobArg {
    fn from(f: f64) -> Self {
        JobArg::Float(f)
    }
}

impl From<Vec<String>> for JobArg {
    fn from(v: Vec<String>) -> Self {
        JobArg::List(v)
    }
}

impl fmt::Display for JobArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobArg::Str(s) => write!(f, "'{s}'"),
            JobArg::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            JobArg::Int(i) => write!(f, "{i}"),
            JobArg::Float(x) => write!(f, "{x}"),
            JobArg::List(v) => write!(f, "[{}]", v.iter().map(|s| format!("'{s}'")).join(", ")),
        }
    }
}

/// A request to run an external job, e.g. a solver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest {
    task: String,
    args: IndexMap<String, JobArg>,
}

impl JobRequest {
    pub fn new(task: &str) -> JobRequest {
        JobRequest {
            task: task.to_string(),
            args: IndexMap::new(),
        }
    }

    pub fn arg<A: Into<JobArg>>(mut self, name: &str, value: A) -> JobRequest {
        self.args.insert(name.to_string(), value.into());
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn args(&self) -> &IndexMap<String, JobArg> {
        &self.args
    }

    pub fn get(&self, name: &str) -> Option<&JobArg> {
        self.args.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.args.get(name) {
            Some(JobArg::Str(s)) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}({})",
            self.task,
            self.args.iter().map(|(k, v)| format!("{k}={v}")).join(", ")
        )
    }
}

/// What happened to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job: JobRequest,
    /// `false` if this was a dry run.
    pub executed: bool,
    pub message: Option<String>,
}

/// Something that can actually run jobs.
pub trait JobRunner {
    fn run(&mut self, job: &JobRequest) -> Result<Option<String>, JobError>;
}

/// Runs tasks and their jobs. It owns the pipeline context; only it changes
/// the context, and only after QA has accepted a result.
pub struct Executor {
    context: Context,
    runner: Box<dyn JobRunner>,
    storage: Box<dyn Storage>,
    qa: QaRegistry,
    gate: QaGate,
    dry_run: bool,
    depth: usize,
}

impl Executor {
    pub fn new(context: Context, runner: Box<dyn JobRunner>, storage: Box<dyn Storage>) -> Executor {
        Executor {
            context,
            runner,
            storage,
            qa: QaRegistry::default(),
            gate: QaGate::default(),
            dry_run: false,
            depth: 0,
        }
    }

    pub fn with_qa(mut self, qa: QaRegistry) -> Executor {
        self.qa = qa;
        self
    }

    pub fn with_gate(mut self, gate: QaGate) -> Executor {
        self.gate = gate;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Executor {
        self.dry_run = dry_run;
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn into_context(self) -> Context {
        self.context
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Where tables are looked for. During a dry run, every table is assumed
    /// to exist.
    pub fn storage(&self) -> &dyn Storage {
        if self.dry_run {
            &AssumeExists
        } else {
            self.storage.as_ref()
        }
    }

    /// Run a job, unless this is a dry run, in which case it's only logged.
    pub fn execute_job(&mut self, job: JobRequest) -> Result<JobResult, JobError> {
        if self.dry_run {
            info!("Dry run; not executing {job}");
            return Ok(JobResult {
                job,
                executed: false,
                message: None,
            });
        }

        debug!("Executing {job}");
        let message = self.runner.run(&job)?;
        Ok(JobResult {
            job,
            executed: true,
            message,
        })
    }

    /// Run a task: prepare, analyse, QA, then (if `merge` is set and QA
    /// accepts the results) merge the results into the context. Every
    /// execution is recorded in the context's history.
    pub fn execute<T: Task + ?Sized>(
        &mut self,
        task: &mut T,
        merge: bool,
    ) -> Result<T::Results, TaskError> {
        let name = task.name();
        let depth = self.depth;
        let stage = if depth == 0 {
            self.context.next_stage()
        } else {
            self.context.stage()
        };
        debug!("Stage {stage}: executing {name} (merge: {merge}, dry run: {})", self.dry_run);

        self.depth += 1;
        let results = task
            .prepare(self)
            .and_then(|results| task.analyse(results, self));
        self.depth -= 1;
        let mut results = results?;

        self.qa.do_qa(&self.context, &mut results);
        let representative = results.qa().representative();

        let outcome = if !merge {
            MergeOutcome::NotRequested
        } else if !self.gate.accepts(&representative) {
            warn!("{name} results were rejected by QA ({representative}); not merging them");
            MergeOutcome::RejectedByQa
        } else {
            let storage: &dyn Storage = if self.dry_run {
                &AssumeExists
            } else {
                self.storage.as_ref()
            };
            results.merge_with_context(&mut self.context, storage)?;
            MergeOutcome::Merged
        };

        self.context.record(StageSummary {
            stage,
            task: name.to_string(),
            depth,
            representative,
            outcome,
        });
        Ok(results)
    }
}
