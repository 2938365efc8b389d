// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tasks that apply flag commands to data.

use indexmap::IndexMap;
use log::debug;

use super::FlagCommand;
use crate::{
    qa::QAScorePool,
    tasks::{Executor, JobRequest, JobResult, Task, TaskError, TaskResults},
};

/// A task that applies flag commands. The commands are handed over before
/// each execution.
pub trait FlagSetter: Task {
    fn flags_to_set(&mut self, commands: Vec<FlagCommand>);
}

/// Applies flag commands with list-mode flagdata jobs. A setter made with
/// [`FlagdataSetter::new`] sends every command to one table; one made with
/// [`FlagdataSetter::per_source`] sends each command to the table its view
/// was computed from, one job per table.
#[derive(Debug, Clone)]
pub struct FlagdataSetter {
    table: Option<String>,
    commands: Vec<FlagCommand>,
}

impl FlagdataSetter {
    pub fn new(table: &str) -> FlagdataSetter {
        FlagdataSetter {
            table: Some(table.to_string()),
            commands: vec![],
        }
    }

    pub fn per_source() -> FlagdataSetter {
        FlagdataSetter {
            table: None,
            commands: vec![],
        }
    }

    /// The table every command is sent to, if there is only one.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// The commands grouped by the table they are applied to, in the order
    /// the tables were first seen.
    fn commands_by_table(&self) -> IndexMap<&str, Vec<&FlagCommand>> {
        let mut by_table: IndexMap<&str, Vec<&FlagCommand>> = IndexMap::new();
        for cmd in &self.commands {
            let table = self.table.as_deref().unwrap_or_else(|| cmd.filename());
            by_table.entry(table).or_default().push(cmd);
        }
        by_table
    }
}

#[derive(Debug, Default)]
pub struct FlagdataSetterResults {
    pub commands: Vec<FlagCommand>,
    pub jobs: Vec<JobResult>,
    qa: QAScorePool,
}

impl TaskResults for FlagdataSetterResults {
    fn task_name(&self) -> &str {
        "flagdata_setter"
    }

    fn qa(&self) -> &QAScorePool {
        &self.qa
    }

    fn qa_mut(&mut self) -> &mut QAScorePool {
        &mut self.qa
    }
}

impl FlagSetter for FlagdataSetter {
    fn flags_to_set(&mut self, commands: Vec<FlagCommand>) {
        self.commands = commands;
    }
}

impl Task for FlagdataSetter {
    type Results = FlagdataSetterResults;

    fn name(&self) -> &'static str {
        "flagdata_setter"
    }

    fn prepare(&mut self, executor: &mut Executor) -> Result<FlagdataSetterResults, TaskError> {
        let mut results = FlagdataSetterResults {
            commands: self.commands.clone(),
            ..Default::default()
        };
        if self.commands.is_empty() {
            debug!("No flags to set");
            return Ok(results);
        }

        for (table, commands) in self.commands_by_table() {
            for cmd in &commands {
                debug!("Flagging {table}: {cmd}");
            }
            let job = JobRequest::new("flagdata")
                .arg("vis", table)
                .arg("mode", "list")
                .arg("action", "apply")
                .arg(
                    "inpfile",
                    commands.iter().map(|c| c.flagcmd()).collect::<Vec<_>>(),
                )
                .arg("savepars", false)
                .arg("flagbackup", false)
                .arg("reason", "any");
            results.jobs.push(executor.execute_job(job)?);
        }
        Ok(results)
    }
}
