// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rules that decide which values of a view should be flagged.

use std::cmp::Ordering;

use itertools::Itertools;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::constants::{
    DEFAULT_FHL_LIMIT, DEFAULT_FHL_MINSAMPLE, DEFAULT_FNM_LIMIT, DEFAULT_NMEDIAN_MINSAMPLE,
    DEFAULT_TMF_LIMIT,
};

fn default_nmedian_minsample() -> usize {
    DEFAULT_NMEDIAN_MINSAMPLE
}

fn default_outlier_minsample() -> usize {
    DEFAULT_FHL_MINSAMPLE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RuleAxis {
    Row,
    Column,
}

/// A flagging rule. Only unflagged, finite values are ever considered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlagRule {
    /// Flag values that deviate from the median of their row by more than
    /// `limit` times that median.
    Nmedian {
        limit: f64,
        #[serde(default = "default_nmedian_minsample")]
        minsample: usize,
    },

    /// Flag values that deviate from the median of the whole view by more
    /// than `limit` median absolute deviations.
    Outlier {
        limit: f64,
        #[serde(default = "default_outlier_minsample")]
        minsample: usize,
    },

    /// Flag values whose magnitude exceeds `limit`.
    MaxAbs { limit: f64 },

    /// Flag values whose magnitude is below `limit`.
    MinAbs { limit: f64 },

    /// Flag whole rows (or columns) if more than a `limit` fraction of them
    /// is already flagged.
    TooManyFlagged { limit: f64, axis: RuleAxis },
}

/// What a rule wants flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Violations {
    /// (row, column) indices, in row-major order.
    Cells(Vec<(usize, usize)>),
    Rows(Vec<usize>),
    Columns(Vec<usize>),
}

impl Violations {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Violations::Cells(v) => v.is_empty(),
            Violations::Rows(v) | Violations::Columns(v) => v.is_empty(),
        }
    }
}

fn usable(value: f64, flag: bool) -> bool {
    !flag && value.is_finite()
}

/// The median of finite values. `values` gets sorted.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

impl FlagRule {
    /// The name used as the reason of flag commands.
    pub fn name(&self) -> &'static str {
        match self {
            FlagRule::Nmedian { .. } => "nmedian",
            FlagRule::Outlier { .. } => "outlier",
            FlagRule::MaxAbs { .. } => "max_abs",
            FlagRule::MinAbs { .. } => "min_abs",
            FlagRule::TooManyFlagged { .. } => "too_many_flagged",
        }
    }

    pub(crate) fn evaluate(&self, data: ArrayView2<f64>, flag: ArrayView2<bool>) -> Violations {
        match *self {
            FlagRule::Nmedian { limit, minsample } => {
                let mut cells = vec![];
                for (i_row, (data_row, flag_row)) in
                    data.outer_iter().zip(flag.outer_iter()).enumerate()
                {
                    let mut values = data_row
                        .iter()
                        .zip(flag_row.iter())
                        .filter(|&(&v, &f)| usable(v, f))
                        .map(|(&v, _)| v)
                        .collect::<Vec<_>>();
                    if values.len() < minsample {
                        continue;
                    }
                    let centre = match median(&mut values) {
                        Some(m) if m != 0.0 => m,
                        _ => continue,
                    };
                    let threshold = limit * centre.abs();
                    for (i_col, (&v, &f)) in data_row.iter().zip(flag_row.iter()).enumerate() {
                        if usable(v, f) && (v - centre).abs() > threshold {
                            cells.push((i_row, i_col));
                        }
                    }
                }
                Violations::Cells(cells)
            }

            FlagRule::Outlier { limit, minsample } => {
                let mut values = data
                    .iter()
                    .zip(flag.iter())
                    .filter(|&(&v, &f)| usable(v, f))
                    .map(|(&v, _)| v)
                    .collect::<Vec<_>>();
                if values.len() < minsample {
                    return Violations::Cells(vec![]);
                }
                let centre = match median(&mut values) {
                    Some(m) => m,
                    None => return Violations::Cells(vec![]),
                };
                let mut deviations = values.iter().map(|v| (v - centre).abs()).collect_vec();
                let mad = match median(&mut deviations) {
                    Some(m) if m > 0.0 => m,
                    _ => return Violations::Cells(vec![]),
                };
                cells_where(data, flag, |v| (v - centre).abs() > limit * mad)
            }

            FlagRule::MaxAbs { limit } => cells_where(data, flag, |v| v.abs() > limit),

            FlagRule::MinAbs { limit } => cells_where(data, flag, |v| v.abs() < limit),

            FlagRule::TooManyFlagged { limit, axis } => {
                let lanes = match axis {
                    RuleAxis::Row => Axis(0),
                    RuleAxis::Column => Axis(1),
                };
                let indices = flag
                    .axis_iter(lanes)
                    .enumerate()
                    .filter(|(_, lane)| !lane.is_empty())
                    .filter(|(_, lane)| {
                        let num_flagged = lane.iter().filter(|&&f| f).count();
                        num_flagged < lane.len()
                            && num_flagged as f64 / lane.len() as f64 > limit
                    })
                    .map(|(i, _)| i)
                    .collect();
                match axis {
                    RuleAxis::Row => Violations::Rows(indices),
                    RuleAxis::Column => Violations::Columns(indices),
                }
            }
        }
    }
}

fn cells_where<F: Fn(f64) -> bool>(
    data: ArrayView2<f64>,
    flag: ArrayView2<bool>,
    violates: F,
) -> Violations {
    Violations::Cells(
        data.indexed_iter()
            .filter(|&(idx, &v)| usable(v, flag[idx]) && violates(v))
            .map(|(idx, _)| idx)
            .collect(),
    )
}

/// Which rules to use, and their limits. Rules are evaluated in the order
/// outlier, max_abs, min_abs, too_many_flagged, nmedian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlagRuleParams {
    pub flag_hilo: bool,
    pub fhl_limit: f64,
    pub fhl_minsample: usize,
    pub flag_maxabs: bool,
    pub fmax_limit: f64,
    pub flag_minabs: bool,
    pub fmin_limit: f64,
    pub flag_tmf: bool,
    pub tmf_limit: f64,
    pub tmf_axis: RuleAxis,
    pub flag_nmedian: bool,
    pub fnm_limit: f64,
    pub fnm_minsample: usize,
}

impl Default for FlagRuleParams {
    fn default() -> Self {
        FlagRuleParams {
            flag_hilo: false,
            fhl_limit: DEFAULT_FHL_LIMIT,
            fhl_minsample: DEFAULT_FHL_MINSAMPLE,
            flag_maxabs: false,
            fmax_limit: 0.1,
            flag_minabs: false,
            fmin_limit: 0.0,
            flag_tmf: false,
            tmf_limit: DEFAULT_TMF_LIMIT,
            tmf_axis: RuleAxis::Row,
            flag_nmedian: false,
            fnm_limit: DEFAULT_FNM_LIMIT,
            fnm_minsample: DEFAULT_NMEDIAN_MINSAMPLE,
        }
    }
}

/// Turn switches and limits into an ordered list of rules.
pub fn make_flag_rules(params: &FlagRuleParams) -> Vec<FlagRule> {
    let mut rules = vec![];
    if params.flag_hilo {
        rules.push(FlagRule::Outlier {
            limit: params.fhl_limit,
            minsample: params.fhl_minsample,
        });
    }
    if params.flag_maxabs {
        rules.push(FlagRule::MaxAbs {
            limit: params.fmax_limit,
        });
    }
    if params.flag_minabs {
        rules.push(FlagRule::MinAbs {
            limit: params.fmin_limit,
        });
    }
    if params.flag_tmf {
        rules.push(FlagRule::TooManyFlagged {
            limit: params.tmf_limit,
            axis: params.tmf_axis,
        });
    }
    if params.flag_nmedian {
        rules.push(FlagRule::Nmedian {
            limit: params.fnm_limit,
            minsample: params.fnm_minsample,
        });
    }
    rules
}
