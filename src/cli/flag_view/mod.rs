// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Iteratively flag views read from a file.
//!
//! The views are held in memory. Each iteration, flag commands are turned
//! into a list-mode flagdata job, which is applied to the in-memory views
//! before they're looked at again.


use std::{
    borrow::Cow,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
};

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::common::{display_warnings, InfoPrinter, Warn, ARG_FILE_HELP};
use crate::{
    callibrary::OverridePolicy,
    constants::{
        DEFAULT_FHL_LIMIT, DEFAULT_FNM_LIMIT, DEFAULT_NITER, DEFAULT_NMEDIAN_MINSAMPLE,
        DEFAULT_TMF_LIMIT,
    },
    context::Context,
    domain::ObservingRun,
    flagging::{
        make_flag_rules, FlagRule, FlagRuleParams, FlagdataSetter, ImageView,
        IterativeViewFlagger, ResultAxis, StopReason, StoredViews, ViewError, ViewStore,
        ViewStoreRunner,
    },
    qa::standard_registry,
    storage::FileSystem,
    tasks::{Executor, InputsError, TaskResults},
    CalpipeError,
};

lazy_static::lazy_static! {
    static ref NITER_HELP: String =
        format!("The maximum number of times flags are applied and the views recomputed. Default: {DEFAULT_NITER}");

    static ref FNM_LIMIT_HELP: String =
        format!("Flag values deviating from their row's median by more than this fraction of the median. Default: {DEFAULT_FNM_LIMIT}");

    static ref FHL_LIMIT_HELP: String =
        format!("Flag values further than this many median absolute deviations from the median. Default: {DEFAULT_FHL_LIMIT}");

    static ref TMF_LIMIT_HELP: String =
        format!("Flag whole rows whose flagged fraction exceeds this. Default: {DEFAULT_TMF_LIMIT}");
}

/// A view as it's written in files. Data and flags are lists of rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ViewSpec {
    filename: String,
    datatype: String,
    #[serde(default)]
    spw: Option<u32>,
    #[serde(default)]
    intent: Option<String>,
    axes: [ResultAxis; 2],
    data: Vec<Vec<f64>>,
    #[serde(default)]
    flag: Option<Vec<Vec<bool>>>,
}

fn rows_to_array<T: Clone>(
    view: &str,
    what: &'static str,
    rows: Vec<Vec<T>>,
) -> Result<Array2<T>, ViewError> {
    let ragged = || ViewError::Ragged {
        view: view.to_string(),
        what,
    };
    let num_rows = rows.len();
    let num_cols = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != num_cols) {
        return Err(ragged());
    }
    Array2::from_shape_vec((num_rows, num_cols), rows.into_iter().flatten().collect())
        .map_err(|_| ragged())
}

impl ViewSpec {
    fn into_view(self) -> Result<ImageView, ViewError> {
        let data = rows_to_array(&self.filename, "data", self.data)?;
        let flag = match self.flag {
            Some(flag) => rows_to_array(&self.filename, "flag", flag)?,
            None => Array2::from_elem(data.dim(), false),
        };
        let mut view = ImageView::new(&self.filename, &self.datatype, self.axes, data, flag)?;
        if let Some(spw) = self.spw {
            view = view.with_spw(spw);
        }
        if let Some(intent) = self.intent.as_deref() {
            view = view.with_intent(intent);
        }
        Ok(view)
    }
}

impl From<&ImageView> for ViewSpec {
    fn from(view: &ImageView) -> ViewSpec {
        ViewSpec {
            filename: view.filename().to_string(),
            datatype: view.datatype().to_string(),
            spw: view.spw(),
            intent: view.intent().map(|i| i.to_string()),
            axes: view.axes().clone(),
            data: view.data().outer_iter().map(|r| r.to_vec()).collect(),
            flag: Some(view.flag().outer_iter().map(|r| r.to_vec()).collect()),
        }
    }
}

/// The layout of a views file.
#[derive(Debug, Deserialize)]
struct ViewsFile {
    #[serde(default)]
    rules: Vec<FlagRule>,
    #[serde(default)]
    views: Vec<ViewSpec>,
}

/// What gets written to `--output-views`.
#[derive(Debug, Serialize)]
struct FlagViewOutput {
    iterations: u32,
    converged: bool,
    stop_reason: StopReason,
    flagcmds: Vec<String>,
    views: Vec<ViewSpec>,
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct FlagViewArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// A TOML or JSON file containing the views to flag (a "views" list) and
    /// optionally the rules to flag them with (a "rules" list).
    #[clap(long, help_heading = "INPUT FILES")]
    pub(super) views: Option<PathBuf>,

    #[clap(long, help = NITER_HELP.as_str(), help_heading = "FLAGGING")]
    pub(super) niter: Option<u32>,

    /// Flag with the n-median rule. If any rule is selected on the command
    /// line, rules in the views file are ignored.
    #[clap(long, help_heading = "FLAGGING")]
    #[serde(default)]
    pub(super) flag_nmedian: bool,

    #[clap(long, help = FNM_LIMIT_HELP.as_str(), help_heading = "FLAGGING")]
    pub(super) fnm_limit: Option<f64>,

    /// Flag outliers relative to the median absolute deviation.
    #[clap(long, help_heading = "FLAGGING")]
    #[serde(default)]
    pub(super) flag_hilo: bool,

    #[clap(long, help = FHL_LIMIT_HELP.as_str(), help_heading = "FLAGGING")]
    pub(super) fhl_limit: Option<f64>,

    /// Flag values whose magnitude is above this.
    #[clap(long, help_heading = "FLAGGING")]
    pub(super) fmax_limit: Option<f64>,

    /// Flag values whose magnitude is below this.
    #[clap(long, help_heading = "FLAGGING")]
    pub(super) fmin_limit: Option<f64>,

    /// Flag whole rows that are already mostly flagged.
    #[clap(long, help_heading = "FLAGGING")]
    #[serde(default)]
    pub(super) flag_tmf: bool,

    #[clap(long, help = TMF_LIMIT_HELP.as_str(), help_heading = "FLAGGING")]
    pub(super) tmf_limit: Option<f64>,

    /// Write the generated flag commands to this file, one per line.
    #[clap(long, help_heading = "OUTPUT FILES")]
    pub(super) output_flagcmds: Option<PathBuf>,

    /// Write the flagged views and a summary of the flagging to this JSON
    /// file.
    #[clap(long, help_heading = "OUTPUT FILES")]
    pub(super) output_views: Option<PathBuf>,
}

#[derive(Debug)]
struct FlagViewParams {
    /// Where the views came from.
    source: String,
    views: Vec<ImageView>,
    rules: Vec<FlagRule>,
    niter: u32,
    output_flagcmds: Option<PathBuf>,
    output_views: Option<PathBuf>,
}

impl FlagViewArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    pub(super) fn merge(self) -> Result<FlagViewArgs, CalpipeError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let FlagViewArgs {
                args_file: _,
                views,
                niter,
                flag_nmedian,
                fnm_limit,
                flag_hilo,
                fhl_limit,
                fmax_limit,
                fmin_limit,
                flag_tmf,
                tmf_limit,
                output_flagcmds,
                output_views,
            } = unpack_arg_file!(arg_file);

            Ok(FlagViewArgs {
                args_file: None,
                views: cli_args.views.or(views),
                niter: cli_args.niter.or(niter),
                flag_nmedian: cli_args.flag_nmedian || flag_nmedian,
                fnm_limit: cli_args.fnm_limit.or(fnm_limit),
                flag_hilo: cli_args.flag_hilo || flag_hilo,
                fhl_limit: cli_args.fhl_limit.or(fhl_limit),
                fmax_limit: cli_args.fmax_limit.or(fmax_limit),
                fmin_limit: cli_args.fmin_limit.or(fmin_limit),
                flag_tmf: cli_args.flag_tmf || flag_tmf,
                tmf_limit: cli_args.tmf_limit.or(tmf_limit),
                output_flagcmds: cli_args.output_flagcmds.or(output_flagcmds),
                output_views: cli_args.output_views.or(output_views),
            })
        } else {
            Ok(cli_args)
        }
    }

    /// The rules selected on the command line, if any.
    fn cli_rules(&self) -> Vec<FlagRule> {
        let defaults = FlagRuleParams::default();
        make_flag_rules(&FlagRuleParams {
            flag_hilo: self.flag_hilo,
            fhl_limit: self.fhl_limit.unwrap_or(defaults.fhl_limit),
            flag_maxabs: self.fmax_limit.is_some(),
            fmax_limit: self.fmax_limit.unwrap_or(defaults.fmax_limit),
            flag_minabs: self.fmin_limit.is_some(),
            fmin_limit: self.fmin_limit.unwrap_or(defaults.fmin_limit),
            flag_tmf: self.flag_tmf,
            tmf_limit: self.tmf_limit.unwrap_or(defaults.tmf_limit),
            flag_nmedian: self.flag_nmedian,
            fnm_limit: self.fnm_limit.unwrap_or(defaults.fnm_limit),
            ..defaults
        })
    }

    fn parse(self) -> Result<FlagViewParams, CalpipeError> {
        debug!("{:#?}", self);

        let cli_rules = self.cli_rules();
        let FlagViewArgs {
            views,
            niter,
            output_flagcmds,
            output_views,
            ..
        } = self;

        let views_file = views.ok_or(InputsError::Missing("views"))?;
        let ViewsFile { rules, views } = unpack_arg_file!(views_file);

        let niter = niter.unwrap_or(DEFAULT_NITER);

        let rules = if !cli_rules.is_empty() {
            if !rules.is_empty() {
                format!(
                    "Ignoring the {} rule(s) in '{}' in favour of the command line",
                    rules.len(),
                    views_file.display()
                )
                .warn();
            }
            cli_rules
        } else if !rules.is_empty() {
            rules
        } else {
            format!(
                "No flagging rules were given; using the n-median rule (limit {DEFAULT_FNM_LIMIT}, minimum sample {DEFAULT_NMEDIAN_MINSAMPLE})"
            )
            .warn();
            make_flag_rules(&FlagRuleParams {
                flag_nmedian: true,
                ..Default::default()
            })
        };

        if views.is_empty() {
            format!("'{}' contains no views", views_file.display()).warn();
        }
        let views = views
            .into_iter()
            .map(|v| v.into_view())
            .collect::<Result<Vec<_>, _>>()?;

        display_warnings();

        Ok(FlagViewParams {
            source: views_file.display().to_string(),
            views,
            rules,
            niter,
            output_flagcmds,
            output_views,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), CalpipeError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;
        params.run(dry_run)
    }
}

impl FlagViewParams {
    fn run(self, dry_run: bool) -> Result<(), CalpipeError> {
        let FlagViewParams {
            source,
            views,
            rules,
            niter,
            output_flagcmds,
            output_views,
        } = self;

        let mut printer = InfoPrinter::new(format!("Flagging views from {source}").into());
        let view_lines: Vec<Cow<'static, str>> = views
            .iter()
            .map(|v| format!("{} ({} flagged)", v.description(), v.num_flagged()).into())
            .collect();
        if !view_lines.is_empty() {
            printer.push_block(view_lines);
        }
        printer.push_line(format!("Rules: {}", rules.iter().map(|r| r.name()).join(", ")).into());
        printer.push_line(format!("At most {niter} iteration(s)").into());
        printer.display();

        let store = ViewStore::new();
        for view in views {
            store.insert(view);
        }

        let context = Context::new(
            PathBuf::from("."),
            ObservingRun::default(),
            OverridePolicy::default(),
        );
        let mut executor = Executor::new(
            context,
            Box::new(ViewStoreRunner::new(store.clone())),
            Box::new(FileSystem),
        )
        .with_qa(standard_registry())
        .with_dry_run(dry_run);

        let mut flagger = IterativeViewFlagger::new(
            StoredViews::new(store),
            FlagdataSetter::per_source(),
            rules,
            niter,
        )?;
        let results = executor.execute(&mut flagger, false)?;

        let flagcmds = results.commands().map(|c| c.flagcmd()).collect::<Vec<_>>();
        let mut printer = InfoPrinter::new("Flagging summary".into());
        printer.push_block(vec![
            format!(
                "Stopped after {} iteration(s): {}",
                results.iterations, results.stop_reason
            )
            .into(),
            format!("{} flag command(s) generated", flagcmds.len()).into(),
        ]);
        let flagged: Vec<Cow<'static, str>> = results
            .views
            .values()
            .map(|f| {
                format!(
                    "{}: {} of {} flagged",
                    f.view.description(),
                    f.view.num_flagged(),
                    f.view.flag().len()
                )
                .into()
            })
            .collect();
        if !flagged.is_empty() {
            printer.push_block(flagged);
        }
        printer.push_line(format!("QA: {}", results.qa().representative()).into());
        printer.display();

        if let Some(output) = output_flagcmds {
            let mut f = BufWriter::new(File::create(&output)?);
            for cmd in &flagcmds {
                writeln!(f, "{cmd}")?;
            }
            f.flush()?;
            info!("Wrote {}", output.display());
        }

        if let Some(output) = output_views {
            let out = FlagViewOutput {
                iterations: results.iterations,
                converged: results.converged,
                stop_reason: results.stop_reason,
                flagcmds,
                views: results
                    .views
                    .values()
                    .map(|f| ViewSpec::from(&f.view))
                    .collect(),
            };
            let mut f = BufWriter::new(File::create(&output)?);
            serde_json::to_writer_pretty(&mut f, &out)?;
            f.flush()?;
            info!("Wrote {}", output.display());
        }

        Ok(())
    }
}
