// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solve for complex gains.

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::resolve_ms;
use crate::{
    callibrary::{CalApplication, CalFrom, CalTo, CalType},
    constants::*,
    context::Context,
    qa::QAScorePool,
    storage::Storage,
    tasks::{
        format_ids, parse_ids, strip_intent_wildcards, CalAppPool, Executor, InputsError,
        JobRequest, JobResult, Task, TaskError, TaskResults,
    },
};

const CALMODES: [&str; 3] = ["a", "p", "ap"];

/// Arguments to the gaincal stage. Anything not given is inferred from the
/// context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaincalArgs {
    pub vis: Option<String>,
    pub caltable: Option<String>,
    pub intent: Option<String>,
    pub spw: Option<String>,
    pub refant: Option<String>,
    pub calmode: Option<String>,
    pub solint: Option<String>,
    pub gaintype: Option<String>,
    pub minsnr: Option<f64>,
    pub interp: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaincalParams {
    pub vis: String,
    pub caltable: PathBuf,
    pub intent: String,
    pub spw: BTreeSet<u32>,
    pub refant: String,
    pub calmode: String,
    pub solint: String,
    pub gaintype: String,
    pub minsnr: f64,
    pub interp: String,
}

impl GaincalArgs {
    pub fn parse(self, context: &Context) -> Result<GaincalParams, InputsError> {
        let ms = resolve_ms(context, self.vis.as_deref())?;
        let intent =
            strip_intent_wildcards(self.intent.as_deref().unwrap_or(DEFAULT_GAINCAL_INTENT));

        let spw = match self.spw.as_deref() {
            Some(s) => {
                let spw = parse_ids("spw", s)?;
                if let Some(bad) = spw
                    .iter()
                    .find(|&&id| ms.spectral_windows.iter().all(|w| w.id != id))
                {
                    return Err(InputsError::Invalid {
                        name: "spw",
                        value: s.to_string(),
                        reason: format!("{} has no spectral window {bad}", ms.name),
                    });
                }
                spw
            }
            None => {
                let science = ms.science_spw_ids();
                ms.spectral_windows_for_intent(&intent)
                    .into_iter()
                    .map(|s| s.id)
                    .filter(|id| science.contains(id))
                    .collect()
            }
        };
        if spw.is_empty() {
            return Err(InputsError::Invalid {
                name: "intent",
                value: intent,
                reason: format!("no science spectral windows of {} have this intent", ms.name),
            });
        }

        let calmode = self
            .calmode
            .unwrap_or_else(|| DEFAULT_GAINCAL_CALMODE.to_string());
        if !CALMODES.contains(&calmode.as_str()) {
            return Err(InputsError::Invalid {
                name: "calmode",
                value: calmode,
                reason: format!("must be one of {}", CALMODES.join(", ")),
            });
        }

        let minsnr = self.minsnr.unwrap_or(DEFAULT_GAINCAL_MINSNR);
        if minsnr.is_nan() || minsnr < 0.0 {
            return Err(InputsError::Invalid {
                name: "minsnr",
                value: minsnr.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }

        let solint = self
            .solint
            .unwrap_or_else(|| DEFAULT_GAINCAL_SOLINT.to_string());
        let caltable = match self.caltable {
            Some(c) => PathBuf::from(c),
            None => context.output_dir.join(format!(
                "{}.s{}.gaincal.{calmode}.{solint}.tbl",
                ms.basename(),
                context.stage()
            )),
        };

        Ok(GaincalParams {
            vis: ms.name.clone(),
            caltable,
            intent,
            spw,
            refant: self.refant.unwrap_or_default(),
            calmode,
            solint,
            gaintype: self
                .gaintype
                .unwrap_or_else(|| DEFAULT_GAINCAL_GAINTYPE.to_string()),
            minsnr,
            interp: self
                .interp
                .unwrap_or_else(|| DEFAULT_CAL_INTERP.to_string()),
        })
    }
}

#[derive(Debug)]
pub struct GaincalResults {
    vis: String,
    calapps: CalAppPool,
    jobs: Vec<JobResult>,
    qa: QAScorePool,
}

impl GaincalResults {
    pub fn vis(&self) -> &str {
        &self.vis
    }

    pub fn calapps(&self) -> &CalAppPool {
        &self.calapps
    }

    pub fn jobs(&self) -> &[JobResult] {
        &self.jobs
    }
}

impl TaskResults for GaincalResults {
    fn task_name(&self) -> &str {
        "gaincal"
    }

    fn qa(&self) -> &QAScorePool {
        &self.qa
    }

    fn qa_mut(&mut self) -> &mut QAScorePool {
        &mut self.qa
    }

    fn merge_with_context(
        &self,
        context: &mut Context,
        storage: &dyn Storage,
    ) -> Result<(), TaskError> {
        context.accept_calapps(self.calapps.accepted(), storage)?;
        Ok(())
    }
}

pub struct Gaincal {
    args: GaincalArgs,
}

impl Gaincal {
    pub fn new(args: GaincalArgs) -> Gaincal {
        Gaincal { args }
    }
}

impl Task for Gaincal {
    type Results = GaincalResults;

    fn name(&self) -> &'static str {
        "gaincal"
    }

    fn prepare(&mut self, executor: &mut Executor) -> Result<GaincalResults, TaskError> {
        let params = self.args.clone().parse(executor.context())?;
        info!(
            "Solving for {} gains of {} spw {} ({}) into {}",
            params.calmode,
            params.vis,
            format_ids(&params.spw),
            params.intent,
            params.caltable.display()
        );

        let job = JobRequest::new("gaincal")
            .arg("vis", params.vis.as_str())
            .arg("caltable", params.caltable.display().to_string())
            .arg("intent", params.intent.as_str())
            .arg("spw", format_ids(&params.spw))
            .arg("solint", params.solint.as_str())
            .arg("gaintype", params.gaintype.as_str())
            .arg("calmode", params.calmode.as_str())
            .arg("minsnr", params.minsnr)
            .arg("refant", params.refant.as_str());
        let job_result = executor.execute_job(job)?;

        let mut calapps = CalAppPool::default();
        calapps.push(CalApplication::single(
            CalTo::new(Some(params.vis.as_str())).with_spws(params.spw.iter().copied()),
            CalFrom::new(
                params.caltable.clone(),
                CalType::Gaincal,
                vec![],
                &params.interp,
                true,
            ),
        ));

        Ok(GaincalResults {
            vis: params.vis,
            calapps,
            jobs: vec![job_result],
            qa: QAScorePool::default(),
        })
    }

    fn analyse(
        &mut self,
        mut results: GaincalResults,
        executor: &mut Executor,
    ) -> Result<GaincalResults, TaskError> {
        results.calapps.verify(executor.storage());
        for calapp in results.calapps.errors() {
            if let Some(table) = calapp.missing_table(executor.storage()) {
                warn!("Calibration table {} was not produced", table.display());
            }
        }
        Ok(results)
    }
}
