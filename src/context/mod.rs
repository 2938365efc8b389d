// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The state shared by all stages of a pipeline run.


use std::path::PathBuf;

use log::debug;
use serde::Serialize;
use strum_macros::Display;

use crate::{
    callibrary::{CalApplication, CalLibrary, CalLibraryError, OverridePolicy},
    domain::ObservingRun,
    qa::QAScore,
    storage::Storage,
};

/// What happened to a result after QA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum MergeOutcome {
    Merged,
    NotRequested,
    RejectedByQa,
}

/// A record of a single task execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub stage: u32,
    pub task: String,
    /// 0 for pipeline stages, 1 for tasks they ran, and so on.
    pub depth: usize,
    pub representative: QAScore,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub output_dir: PathBuf,
    pub observing_run: ObservingRun,
    pub callibrary: CalLibrary,
    stage: u32,
    history: Vec<StageSummary>,
}

impl Context {
    pub fn new(output_dir: PathBuf, observing_run: ObservingRun, policy: OverridePolicy) -> Context {
        Context {
            output_dir,
            observing_run,
            callibrary: CalLibrary::new(policy),
            stage: 0,
            history: vec![],
        }
    }

    /// The number of the stage currently (or most recently) executing. Stages
    /// are numbered from 1.
    pub fn stage(&self) -> u32 {
        self.stage
    }

    pub(crate) fn next_stage(&mut self) -> u32 {
        self.stage += 1;
        self.stage
    }

    pub fn history(&self) -> &[StageSummary] {
        &self.history
    }

    pub(crate) fn record(&mut self, summary: StageSummary) {
        debug!(
            "Stage {} {}: QA {}, {}",
            summary.stage, summary.task, summary.representative, summary.outcome
        );
        self.history.push(summary);
    }

    /// Activate calibration applications. They are gathered into their own
    /// library first, which is then merged into the context's, so that nothing
    /// changes if any of their tables are missing.
    pub fn accept_calapps(
        &mut self,
        calapps: &[CalApplication],
        storage: &dyn Storage,
    ) -> Result<(), CalLibraryError> {
        let mut fragment = CalLibrary::new(self.callibrary.policy());
        for calapp in calapps {
            fragment.add(calapp.clone());
            fragment.activate(calapp.clone(), storage)?;
        }
        self.callibrary = self.callibrary.merge(&fragment);
        Ok(())
    }
}
