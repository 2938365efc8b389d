// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pipeline stages built on the task framework.

mod gaincal;
mod lowgainflag;
#[cfg(test)]
mod tests;

pub use gaincal::{Gaincal, GaincalArgs, GaincalParams, GaincalResults};
pub use lowgainflag::{Lowgainflag, LowgainflagArgs, LowgainflagParams};

use crate::{context::Context, domain::MeasurementSet, tasks::InputsError};

/// Resolve the measurement set a stage works on: the named one, or the only
/// one there is.
fn resolve_ms<'a>(
    context: &'a Context,
    vis: Option<&str>,
) -> Result<&'a MeasurementSet, InputsError> {
    match vis {
        Some(vis) => Ok(context.observing_run.get_ms(Some(vis), None)?),
        None => match context.observing_run.measurement_sets() {
            [ms] => Ok(ms),
            _ => Err(InputsError::Missing("vis")),
        },
    }
}
