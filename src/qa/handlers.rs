// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! QA handlers for the results `calpipe` knows how to produce.

use log::debug;

use super::{QAScore, QaHandler, QaRegistry};
use crate::{
    constants::{CANCELLED_FLAGGING_SCORE, UNCONVERGED_FLAGGING_SCORE},
    context::Context,
    flagging::{StopReason, ViewFlaggerResults},
    stages::GaincalResults,
    tasks::{CalAppPool, ResultsList, TaskResults},
};

/// A registry with every standard handler.
pub fn standard_registry() -> QaRegistry {
    let mut registry = QaRegistry::new();
    registry.add_handler(QaHandler::for_results::<GaincalResults, _>(
        "GaincalQaHandler",
        |_, results| {
            if let Some(score) = score_calapps(results.calapps(), results.vis()) {
                results.qa_mut().push(score);
            }
        },
    ));
    registry.add_handler(QaHandler::for_results::<ViewFlaggerResults, _>(
        "ViewFlaggerQaHandler",
        score_view_flagging,
    ));
    registry.add_handler(QaHandler::for_results::<ResultsList, _>(
        "ResultsListQaHandler",
        collate_list,
    ));
    registry
}

/// The fraction of proposed calibration tables that were actually produced.
fn score_calapps(calapps: &CalAppPool, vis: &str) -> Option<QAScore> {
    let num_proposed = calapps.pool().len();
    if num_proposed == 0 {
        return None;
    }
    let num_missing = calapps.errors().len();
    let score = (num_proposed - num_missing) as f64 / num_proposed as f64;
    let score = if num_missing == 0 {
        QAScore::new(
            score,
            &format!("All {num_proposed} calibration table(s) for {vis} were produced"),
            "Tables present",
        )
    } else {
        QAScore::new(
            score,
            &format!("{num_missing} of {num_proposed} calibration table(s) for {vis} are missing"),
            "Missing tables",
        )
    };
    Some(score.for_vis(vis))
}

fn score_view_flagging(_: &Context, results: &mut ViewFlaggerResults) {
    let (num_cells, num_flagged) = results.views.values().fold((0, 0), |(n, f), v| {
        (n + v.view.data().len(), f + v.view.num_flagged())
    });
    let mut scores = vec![];
    if num_cells > 0 {
        let fraction = num_flagged as f64 / num_cells as f64;
        scores.push(QAScore::new(
            1.0 - fraction,
            &format!(
                "{:.1}% of the data in {} view(s) is flagged",
                fraction * 100.0,
                results.views.len()
            ),
            "Flagged fraction",
        ));
    }

    match results.stop_reason {
        StopReason::Converged => (),
        StopReason::IterationLimit => scores.push(QAScore::new(
            UNCONVERGED_FLAGGING_SCORE,
            &format!(
                "Flagging did not converge within {} iteration(s)",
                results.niter
            ),
            "Not converged",
        )),
        StopReason::Cancelled => scores.push(QAScore::new(
            CANCELLED_FLAGGING_SCORE,
            "Flagging was cancelled",
            "Cancelled",
        )),
    }

    for score in scores {
        debug!("{}: {}", results.task_name(), score.longmsg);
        results.qa_mut().push(score);
    }
}

/// A list is as good as its worst element.
fn collate_list(_: &Context, list: &mut ResultsList) {
    let scores = list
        .iter()
        .map(|r| r.qa().representative())
        .filter(|s| s.score.is_some())
        .collect::<Vec<_>>();
    for score in scores {
        list.qa_mut().push(score);
    }
}
