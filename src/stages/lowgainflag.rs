// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag antennas with low gains.
//!
//! Gain amplitudes are solved for on the bandpass calibrator, arranged as an
//! antenna-by-time view per spectral window, and values far from their
//! antenna's median are flagged in the measurement set. Solving and flagging
//! repeat until nothing else needs flagging.

use std::collections::BTreeSet;
use std::path::Path;
use std::rc::Rc;

use log::{info, warn};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::{resolve_ms, Gaincal, GaincalArgs};
use crate::{
    caltable::{CalTableReader, CalTableRow},
    constants::*,
    context::Context,
    domain::MeasurementSet,
    flagging::{
        make_flag_rules, CancelToken, FlagRule, FlagRuleParams, FlagdataSetter, ImageView,
        IterativeViewFlagger, ResultAxis, ViewError, ViewFlaggerResults, ViewResults,
    },
    tasks::{
        format_ids, parse_ids, strip_intent_wildcards, Executor, InputsError, Task, TaskError,
    },
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LowgainflagArgs {
    pub vis: Option<String>,
    pub intent: Option<String>,
    pub spw: Option<String>,
    pub refant: Option<String>,
    pub flag_nmedian: Option<bool>,
    pub fnm_limit: Option<f64>,
    pub niter: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LowgainflagParams {
    pub vis: String,
    pub intent: String,
    pub spw: BTreeSet<u32>,
    pub refant: String,
    pub rules: Vec<FlagRule>,
    pub niter: u32,
}

impl LowgainflagArgs {
    pub fn parse(self, context: &Context) -> Result<LowgainflagParams, InputsError> {
        let ms = resolve_ms(context, self.vis.as_deref())?;
        let intent =
            strip_intent_wildcards(self.intent.as_deref().unwrap_or(DEFAULT_LOWGAINFLAG_INTENT));
        let spw = match self.spw.as_deref() {
            Some(s) => parse_ids("spw", s)?,
            None => ms.science_spw_ids().into_iter().collect(),
        };

        let fnm_limit = self.fnm_limit.unwrap_or(DEFAULT_FNM_LIMIT);
        if fnm_limit.is_nan() || fnm_limit < 0.0 {
            return Err(InputsError::Invalid {
                name: "fnm_limit",
                value: fnm_limit.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        let rules = make_flag_rules(&FlagRuleParams {
            flag_nmedian: self.flag_nmedian.unwrap_or(true),
            fnm_limit,
            ..Default::default()
        });

        Ok(LowgainflagParams {
            vis: ms.name.clone(),
            intent,
            spw,
            refant: self.refant.unwrap_or_default(),
            rules,
            niter: self.niter.unwrap_or(DEFAULT_NITER),
        })
    }
}

/// The low-gain flagging stage.
pub struct Lowgainflag {
    args: LowgainflagArgs,
    reader: Rc<dyn CalTableReader>,
    cancel: CancelToken,
}

impl Lowgainflag {
    pub fn new(args: LowgainflagArgs, reader: Rc<dyn CalTableReader>) -> Lowgainflag {
        Lowgainflag {
            args,
            reader,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Lowgainflag {
        self.cancel = cancel;
        self
    }
}

impl Task for Lowgainflag {
    type Results = ViewFlaggerResults;

    fn name(&self) -> &'static str {
        "lowgainflag"
    }

    fn prepare(&mut self, executor: &mut Executor) -> Result<ViewFlaggerResults, TaskError> {
        let params = self.args.clone().parse(executor.context())?;
        info!(
            "Flagging low gains of {} spw {} ({} rule(s), at most {} iteration(s))",
            params.vis,
            format_ids(&params.spw),
            params.rules.len(),
            params.niter
        );

        let setter = FlagdataSetter::new(&params.vis);
        let rules = params.rules.clone();
        let niter = params.niter;
        let worker = LowgainflagWorker {
            params,
            reader: Rc::clone(&self.reader),
        };
        let mut flagger = IterativeViewFlagger::new(worker, setter, rules, niter)?
            .named("lowgainflag")
            .with_cancel_token(self.cancel.clone());
        flagger.prepare(executor)
    }
}

/// Solves for gain amplitudes and turns them into views.
struct LowgainflagWorker {
    params: LowgainflagParams,
    reader: Rc<dyn CalTableReader>,
}

impl Task for LowgainflagWorker {
    type Results = ViewResults;

    fn name(&self) -> &'static str {
        "lowgainflagworker"
    }

    fn prepare(&mut self, executor: &mut Executor) -> Result<ViewResults, TaskError> {
        let params = &self.params;
        let mut gaincal = Gaincal::new(GaincalArgs {
            vis: Some(params.vis.clone()),
            intent: Some(params.intent.clone()),
            spw: Some(format_ids(&params.spw)),
            refant: Some(params.refant.clone()),
            calmode: Some("a".to_string()),
            solint: Some(DEFAULT_GAINCAL_SOLINT.to_string()),
            ..Default::default()
        });
        let gaincal_results = executor.execute(&mut gaincal, true)?;
        let table = match gaincal_results.calapps().accepted() {
            [calapp] => calapp.calfrom().first().gaintable().to_path_buf(),
            other => {
                return Err(TaskError::Verification {
                    task: "lowgainflag",
                    reason: format!("expected one gain table, but got {}", other.len()),
                })
            }
        };

        let mut results = ViewResults::new(self.name());
        if executor.is_dry_run() {
            info!("Dry run; not reading {}", table.display());
            return Ok(results);
        }

        let rows = self.reader.read(&table)?;
        let ms = executor
            .context()
            .observing_run
            .get_ms(Some(params.vis.as_str()), None)?;
        for &spw in &params.spw {
            match gain_amplitude_view(&table, spw, &params.intent, ms, &rows)? {
                Some(view) => results.add_view(view),
                None => warn!("{} has no solutions for spw {spw}", table.display()),
            }
        }
        Ok(results)
    }
}

/// Gain amplitudes of one spectral window, antenna by time. Antennas without
/// solutions are entirely flagged.
fn gain_amplitude_view(
    table: &Path,
    spw: u32,
    intent: &str,
    ms: &MeasurementSet,
    rows: &[CalTableRow],
) -> Result<Option<ImageView>, ViewError> {
    let rows = rows.iter().filter(|r| r.spw == spw).collect::<Vec<_>>();
    if rows.is_empty() {
        return Ok(None);
    }

    // Rows are the catalog's antennas plus any others with solutions.
    let antennas = ms
        .antennas
        .iter()
        .map(|a| a.id)
        .chain(rows.iter().map(|r| r.antenna))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let mut times = rows.iter().map(|r| r.time).collect::<Vec<_>>();
    times.sort_unstable_by(|a, b| a.total_cmp(b));
    times.dedup();

    let mut data = Array2::<f64>::zeros((antennas.len(), times.len()));
    let mut flag = Array2::from_elem(data.dim(), true);
    for row in rows {
        // Every antenna and time came from these rows, so both are found.
        let i_ant = antennas.binary_search(&row.antenna);
        let i_time = times.iter().position(|&t| t == row.time);
        if let (Ok(i_ant), Some(i_time)) = (i_ant, i_time) {
            let idx = (i_ant, i_time);
            data[idx] = row.amplitude;
            flag[idx] = row.flagged || !row.amplitude.is_finite();
        }
    }

    let axes = [
        ResultAxis::new(
            "Antenna1",
            "id",
            antennas.into_iter().map(f64::from).collect(),
        ),
        ResultAxis::new("Time", "s", times),
    ];
    ImageView::new(
        &table.display().to_string(),
        "gain amplitude",
        axes,
        data,
        flag,
    )
    .map(|view| Some(view.with_spw(spw).with_intent(intent)))
}
