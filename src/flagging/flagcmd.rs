// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag commands: which parts of which data to flag, and why.
//!
//! Commands render as (and parse from) the flagdata list-mode syntax, e.g.
//!
//! ```text
//! mode='manual' antenna='1' timerange='4.5~7.5' spw='17' reason='nmedian'
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{rules::Violations, FlagRule, ImageView, ViewError};

/// An inclusive range of coordinates along one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSelection {
    pub axis: String,
    pub start: f64,
    pub end: f64,
}

/// The flagdata keyword for an axis.
fn flagdata_key(axis: &str) -> String {
    let lower = axis.to_lowercase();
    match lower.as_str() {
        "time" | "timerange" => "timerange".to_string(),
        "antenna" | "antenna1" => "antenna".to_string(),
        _ => lower,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagCommand {
    /// The table the flags belong to. Empty if unknown.
    #[serde(default)]
    filename: String,
    #[serde(default)]
    spw: Option<u32>,
    #[serde(default)]
    intent: Option<String>,
    selections: Vec<AxisSelection>,
    reason: String,
}

impl FlagCommand {
    pub fn new(filename: &str, reason: &str) -> FlagCommand {
        FlagCommand {
            filename: filename.to_string(),
            spw: None,
            intent: None,
            selections: vec![],
            reason: reason.to_string(),
        }
    }

    pub fn with_spw(mut self, spw: Option<u32>) -> FlagCommand {
        self.spw = spw;
        self
    }

    pub fn with_intent(mut self, intent: Option<&str>) -> FlagCommand {
        self.intent = intent.map(|i| i.to_string());
        self
    }

    pub fn select(mut self, axis: &str, start: f64, end: f64) -> FlagCommand {
        self.selections.push(AxisSelection {
            axis: axis.to_string(),
            start,
            end,
        });
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn spw(&self) -> Option<u32> {
        self.spw
    }

    pub fn intent(&self) -> Option<&str> {
        self.intent.as_deref()
    }

    pub fn selections(&self) -> &[AxisSelection] {
        &self.selections
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// This command in flagdata list-mode syntax.
    pub fn flagcmd(&self) -> String {
        let mut parts = vec!["mode='manual'".to_string()];
        for sel in &self.selections {
            let key = flagdata_key(&sel.axis);
            if sel.start == sel.end {
                parts.push(format!("{key}='{}'", sel.start));
            } else {
                parts.push(format!("{key}='{}~{}'", sel.start, sel.end));
            }
        }
        if let Some(spw) = self.spw {
            parts.push(format!("spw='{spw}'"));
        }
        if let Some(intent) = &self.intent {
            parts.push(format!("intent='{intent}'"));
        }
        parts.push(format!("reason='{}'", self.reason));
        parts.join(" ")
    }

    /// Whether the cell at the given (axis name, coordinate) pairs is selected.
    /// A selection on an axis the cell doesn't have selects nothing.
    pub(crate) fn covers(&self, row: (&str, f64), col: (&str, f64)) -> bool {
        let row_key = flagdata_key(row.0);
        let col_key = flagdata_key(col.0);
        self.selections.iter().all(|sel| {
            let key = flagdata_key(&sel.axis);
            let value = if key == row_key {
                row.1
            } else if key == col_key {
                col.1
            } else {
                return false;
            };
            sel.start <= value && value <= sel.end
        })
    }
}

impl fmt::Display for FlagCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.flagcmd())
    }
}

impl FromStr for FlagCommand {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason: String| ViewError::BadFlagCommand {
            cmd: s.to_string(),
            reason,
        };
        let parse_coord = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| bad(format!("'{v}' is not a number")))
        };

        let mut cmd = FlagCommand::new("", "");
        let mut rest = s.trim();
        while !rest.is_empty() {
            let (key, after) = rest
                .split_once("='")
                .ok_or_else(|| bad(format!("expected key='value' at \"{rest}\"")))?;
            let (value, after) = after
                .split_once('\'')
                .ok_or_else(|| bad(format!("unterminated quote after {key}")))?;
            match key.trim() {
                "mode" => (),
                "spw" => {
                    cmd.spw = Some(
                        value
                            .parse()
                            .map_err(|_| bad(format!("spw '{value}' is not an integer")))?,
                    )
                }
                "intent" => cmd.intent = Some(value.to_string()),
                "reason" => cmd.reason = value.to_string(),
                axis => {
                    let (start, end) = value.split_once('~').unwrap_or((value, value));
                    cmd.selections.push(AxisSelection {
                        axis: axis.to_string(),
                        start: parse_coord(start)?,
                        end: parse_coord(end)?,
                    });
                }
            }
            rest = after.trim_start();
        }
        Ok(cmd)
    }
}

/// Express what a rule wants flagged in a view as commands. Adjacent flagged
/// cells in a row become a single command if the column coordinates increase
/// monotonically.
pub(crate) fn commands_from_violations(
    view: &ImageView,
    rule: &FlagRule,
    violations: &Violations,
) -> Vec<FlagCommand> {
    let [rows, cols] = view.axes();
    let new_cmd = || {
        FlagCommand::new(view.filename(), rule.name())
            .with_spw(view.spw())
            .with_intent(view.intent())
    };

    match violations {
        Violations::Cells(cells) => {
            let cols_increasing = cols.values.windows(2).all(|w| w[0] < w[1]);
            let mut cells = cells.clone();
            cells.sort_unstable();

            // Runs of (row, first column, last column).
            let mut runs: Vec<(usize, usize, usize)> = vec![];
            for (i_row, i_col) in cells {
                let extends = matches!(
                    runs.last(),
                    Some(&(r, _, last)) if cols_increasing && r == i_row && last + 1 == i_col
                );
                if !extends {
                    runs.push((i_row, i_col, i_col));
                } else if let Some(run) = runs.last_mut() {
                    run.2 = i_col;
                }
            }

            runs.into_iter()
                .map(|(i_row, first, last)| {
                    let row_value = rows.values[i_row];
                    new_cmd()
                        .select(&rows.name, row_value, row_value)
                        .select(&cols.name, cols.values[first], cols.values[last])
                })
                .collect()
        }

        Violations::Rows(indices) => indices
            .iter()
            .map(|&i| new_cmd().select(&rows.name, rows.values[i], rows.values[i]))
            .collect(),

        Violations::Columns(indices) => indices
            .iter()
            .map(|&i| new_cmd().select(&cols.name, cols.values[i], cols.values[i]))
            .collect(),
    }
}
