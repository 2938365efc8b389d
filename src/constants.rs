// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Default values used throughout `calpipe`.

Anything a user might reasonably want to change should be a default here and
an optional argument elsewhere.
 */

/// The interpolation used when applying a calibration table, unless told
/// otherwise.
pub const DEFAULT_CAL_INTERP: &str = "linear";

/// The most IDs a single "start~end" range may expand to.
pub const MAX_ID_RANGE_LEN: u32 = 10_000;

/// The maximum number of flag-and-recompute iterations an iterative view
/// flagger performs.
pub const DEFAULT_NITER: u32 = 1;

/// The default deviation limit of the n-median rule, as a fraction of a row's
/// median.
pub const DEFAULT_FNM_LIMIT: f64 = 0.5;

/// Rows with fewer unflagged values than this are not considered by the
/// n-median rule.
pub const DEFAULT_NMEDIAN_MINSAMPLE: usize = 3;

/// The default outlier limit, in units of the median absolute deviation.
pub const DEFAULT_FHL_LIMIT: f64 = 5.0;

/// Views with fewer unflagged values than this are not considered by the
/// outlier rule.
pub const DEFAULT_FHL_MINSAMPLE: usize = 5;

/// Rows (or columns) with a larger flagged fraction than this get flagged
/// entirely by the "too many flagged" rule.
pub const DEFAULT_TMF_LIMIT: f64 = 0.5;

/// The intent of the data the low-gain flagger solves against.
pub const DEFAULT_LOWGAINFLAG_INTENT: &str = "BANDPASS";

/// Gaincal defaults.
pub const DEFAULT_GAINCAL_INTENT: &str = "PHASE";
pub const DEFAULT_GAINCAL_CALMODE: &str = "ap";
pub const DEFAULT_GAINCAL_SOLINT: &str = "int";
pub const DEFAULT_GAINCAL_GAINTYPE: &str = "G";
pub const DEFAULT_GAINCAL_MINSNR: f64 = 3.0;

/// The QA score given to an iterative flagging run that ran out of iterations
/// before converging.
pub const UNCONVERGED_FLAGGING_SCORE: f64 = 0.9;

/// The QA score given to an iterative flagging run that was cancelled.
pub const CANCELLED_FLAGGING_SCORE: f64 = 0.0;
