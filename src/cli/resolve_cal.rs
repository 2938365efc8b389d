// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Build a calibration library from files of calibration applications and
//! resolve which tables apply to some data.

use std::{
    borrow::Cow,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    str::FromStr,
};

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use super::common::{
    display_warnings, InfoPrinter, Warn, ARG_FILE_HELP, OVERRIDE_POLICIES_COMMA_SEPARATED,
    OVERRIDE_POLICY_HELP,
};
use crate::{
    callibrary::{CalApplication, CalFrom, CalLibrary, OverridePolicy},
    storage::{AssumeExists, FileSystem, Storage},
    tasks::InputsError,
    CalpipeError,
};

/// The layout of a calibration applications file.
#[derive(Debug, Deserialize)]
struct CalAppsFile {
    #[serde(default)]
    calapp: Vec<CalApplication>,
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct ResolveCalArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// Files of calibration applications (a TOML or JSON "calapp" list).
    /// Applications are activated in the order they appear.
    #[clap(short, long, multiple_values(true), help_heading = "CALIBRATION LIBRARY")]
    pub(super) calapps: Option<Vec<PathBuf>>,

    #[clap(long, help = OVERRIDE_POLICY_HELP.as_str(), help_heading = "CALIBRATION LIBRARY")]
    pub(super) policy: Option<String>,

    /// Activate applications even if their tables don't exist.
    #[clap(long, help_heading = "CALIBRATION LIBRARY")]
    #[serde(default)]
    pub(super) ignore_missing_tables: bool,

    /// The visibility set to resolve calibrations for. If this isn't given,
    /// the library is only summarised.
    #[clap(long, help_heading = "QUERY")]
    pub(super) vis: Option<String>,

    /// The spectral window ID to resolve calibrations for.
    #[clap(long, help_heading = "QUERY")]
    pub(super) spw: Option<u32>,

    /// The field ID to resolve calibrations for.
    #[clap(long, help_heading = "QUERY")]
    pub(super) field: Option<u32>,

    /// The antenna ID to resolve calibrations for.
    #[clap(long, help_heading = "QUERY")]
    pub(super) antenna: Option<u32>,

    /// The intent to resolve calibrations for, e.g. TARGET.
    #[clap(long, help_heading = "QUERY")]
    pub(super) intent: Option<String>,

    /// Write the applicable calibrations to this JSON file.
    #[clap(short, long, help_heading = "OUTPUT FILES")]
    pub(super) output: Option<PathBuf>,
}

#[derive(Debug)]
struct Query {
    vis: String,
    spw: u32,
    field: u32,
    antenna: u32,
    intent: String,
}

#[derive(Debug)]
struct ResolveCalParams {
    library: CalLibrary,
    query: Option<Query>,
    output: Option<PathBuf>,
}

impl ResolveCalArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    pub(super) fn merge(self) -> Result<ResolveCalArgs, CalpipeError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let ResolveCalArgs {
                args_file: _,
                calapps,
                policy,
                ignore_missing_tables,
                vis,
                spw,
                field,
                antenna,
                intent,
                output,
            } = unpack_arg_file!(arg_file);

            Ok(ResolveCalArgs {
                args_file: None,
                calapps: cli_args.calapps.or(calapps),
                policy: cli_args.policy.or(policy),
                ignore_missing_tables: cli_args.ignore_missing_tables || ignore_missing_tables,
                vis: cli_args.vis.or(vis),
                spw: cli_args.spw.or(spw),
                field: cli_args.field.or(field),
                antenna: cli_args.antenna.or(antenna),
                intent: cli_args.intent.or(intent),
                output: cli_args.output.or(output),
            })
        } else {
            Ok(cli_args)
        }
    }

    fn parse(self, dry_run: bool) -> Result<ResolveCalParams, CalpipeError> {
        debug!("{:#?}", self);

        let ResolveCalArgs {
            args_file: _,
            calapps,
            policy,
            ignore_missing_tables,
            vis,
            spw,
            field,
            antenna,
            intent,
            output,
        } = self;

        let calapp_files = match calapps {
            Some(files) if !files.is_empty() => files,
            _ => return Err(InputsError::Missing("calapps").into()),
        };

        let policy = match policy {
            None => OverridePolicy::default(),
            Some(p) => OverridePolicy::from_str(&p).map_err(|_| InputsError::Invalid {
                name: "policy",
                reason: format!(
                    "supported policies are: {}",
                    *OVERRIDE_POLICIES_COMMA_SEPARATED
                ),
                value: p,
            })?,
        };

        let query = match vis {
            None => {
                if spw.is_some() || field.is_some() || antenna.is_some() || intent.is_some() {
                    "Query selectors were given without --vis; only summarising the library"
                        .warn();
                }
                None
            }
            Some(vis) => Some(Query {
                vis,
                spw: spw.ok_or(InputsError::Missing("spw"))?,
                field: field.ok_or(InputsError::Missing("field"))?,
                antenna: antenna.ok_or(InputsError::Missing("antenna"))?,
                intent: intent.ok_or(InputsError::Missing("intent"))?,
            }),
        };

        let storage: Box<dyn Storage> = if dry_run || ignore_missing_tables {
            if ignore_missing_tables {
                "Not checking that calibration tables exist".warn();
            }
            Box::new(AssumeExists)
        } else {
            Box::new(FileSystem)
        };

        let mut library = CalLibrary::new(policy);
        for file in calapp_files {
            let CalAppsFile { calapp } = unpack_arg_file!(file);
            if calapp.is_empty() {
                format!("'{}' has no calibration applications", file.display()).warn();
            }
            for calapp in calapp {
                library.add(calapp.clone());
                library.activate(calapp, storage.as_ref())?;
            }
        }

        display_warnings();

        Ok(ResolveCalParams {
            library,
            query,
            output,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), CalpipeError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse(dry_run)?;
        params.display();

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()
    }
}

impl ResolveCalParams {
    fn display(&self) {
        let mut printer = InfoPrinter::new(
            format!("Calibration library ({} policy)", self.library.policy()).into(),
        );
        let active: Vec<Cow<'static, str>> = self
            .library
            .active()
            .map(|c| c.to_string().into())
            .collect();
        if active.is_empty() {
            printer.push_line("No active calibration applications".into());
        } else {
            printer.push_block(active);
        }
        let shadowed: Vec<Cow<'static, str>> = self
            .library
            .shadowed()
            .map(|(old, new)| format!("{} shadowed by {}", old.calto(), new.calto()).into())
            .collect();
        if !shadowed.is_empty() {
            printer.push_block(shadowed);
        }
        printer.display();
    }

    fn run(self) -> Result<(), CalpipeError> {
        let query = match self.query {
            Some(q) => q,
            None => return Ok(()),
        };

        let applicable: Vec<CalFrom> = self.library.get_applicable(
            &query.vis,
            query.spw,
            query.field,
            query.antenna,
            &query.intent,
        );

        let mut printer = InfoPrinter::new(
            format!(
                "Applicable calibrations for vis '{}', spw {}, field {}, antenna {}, intent {}",
                query.vis, query.spw, query.field, query.antenna, query.intent
            )
            .into(),
        );
        if applicable.is_empty() {
            printer.push_line("None".into());
        } else {
            printer.push_block(applicable.iter().map(|c| c.to_string().into()).collect());
        }
        printer.display();

        if let Some(output) = self.output {
            let mut f = BufWriter::new(File::create(&output)?);
            serde_json::to_writer_pretty(&mut f, &applicable)?;
            f.flush()?;
            info!("Wrote {}", output.display());
        }

        Ok(())
    }
}
