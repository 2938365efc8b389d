// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Quality assessment of task results.
//!
//! Every result carries a [`QAScorePool`]. Handlers registered with a
//! [`QaRegistry`] inspect results after a task has run and push scores into
//! that pool; the pool's representative score (the worst one, unless a handler
//! chose otherwise) then decides whether the result may be merged into the
//! pipeline context.

mod handlers;
mod registry;

pub use handlers::standard_registry;
pub use registry::{QaHandler, QaRegistry};

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a score refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QATarget {
    #[serde(default)]
    pub vis: Option<String>,
    #[serde(default)]
    pub spw: Option<u32>,
}

/// A single quality score. Scores are in [0, 1], higher being better. A score
/// of `None` means the result couldn't be assessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QAScore {
    pub score: Option<f64>,
    pub longmsg: String,
    pub shortmsg: String,
    #[serde(default)]
    pub target: QATarget,
}

impl QAScore {
    pub fn new(score: f64, longmsg: &str, shortmsg: &str) -> QAScore {
        QAScore {
            score: Some(score),
            longmsg: longmsg.to_string(),
            shortmsg: shortmsg.to_string(),
            target: QATarget::default(),
        }
    }

    /// The score of something that hasn't been assessed.
    pub fn no_qa() -> QAScore {
        QAScore {
            score: None,
            longmsg: "No QA scores registered for this task".to_string(),
            shortmsg: "No QA".to_string(),
            target: QATarget::default(),
        }
    }

    pub fn for_vis(mut self, vis: &str) -> QAScore {
        self.target.vis = Some(vis.to_string());
        self
    }

    pub fn for_spw(mut self, spw: u32) -> QAScore {
        self.target.spw = Some(spw);
        self
    }

    /// The numeric score, if it's usable for comparisons.
    fn comparable(&self) -> Option<f64> {
        self.score.filter(|s| !s.is_nan())
    }
}

impl fmt::Display for QAScore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.score {
            Some(s) => write!(f, "{s:.3} ({})", self.shortmsg),
            None => write!(f, "N/A ({})", self.shortmsg),
        }
    }
}

/// The scores collected for a single result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QAScorePool {
    #[serde(default)]
    pool: Vec<QAScore>,
    #[serde(default)]
    representative: Option<QAScore>,
}

impl QAScorePool {
    pub fn new() -> QAScorePool {
        QAScorePool::default()
    }

    pub fn push(&mut self, score: QAScore) {
        self.pool.push(score);
    }

    pub fn scores(&self) -> &[QAScore] {
        &self.pool
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Freeze the representative score, rather than letting it be the worst
    /// score in the pool.
    pub fn set_representative(&mut self, score: QAScore) {
        self.representative = Some(score);
    }

    /// The score summarising this pool. Unless one was set explicitly, this is
    /// the lowest score in the pool (the earliest one if several are equally
    /// low). Scores that couldn't be assessed are only representative if there
    /// is nothing else.
    pub fn representative(&self) -> QAScore {
        if let Some(r) = &self.representative {
            return r.clone();
        }

        let mut lowest: Option<(&QAScore, f64)> = None;
        for score in &self.pool {
            if let Some(s) = score.comparable() {
                match lowest {
                    Some((_, l)) if s >= l => (),
                    _ => lowest = Some((score, s)),
                }
            }
        }
        match lowest {
            Some((score, _)) => score.clone(),
            None => self.pool.first().cloned().unwrap_or_else(QAScore::no_qa),
        }
    }

    /// A new pool with the scores of both `self` and `other`. Neither input is
    /// modified. An explicit representative on `self` takes precedence over
    /// one on `other`.
    pub fn merge(&self, other: &QAScorePool) -> QAScorePool {
        QAScorePool {
            pool: self.pool.iter().chain(other.pool.iter()).cloned().collect(),
            representative: self
                .representative
                .clone()
                .or_else(|| other.representative.clone()),
        }
    }
}

/// Decides whether a result is good enough to be merged into the context.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QaGate {
    accept_threshold: Option<f64>,
}

impl QaGate {
    pub fn new(accept_threshold: Option<f64>) -> QaGate {
        QaGate { accept_threshold }
    }

    pub fn accept_threshold(&self) -> Option<f64> {
        self.accept_threshold
    }

    /// Scores strictly below the threshold are rejected. Without a threshold,
    /// or without a numeric score, everything is accepted.
    pub fn accepts(&self, score: &QAScore) -> bool {
        match (self.accept_threshold, score.comparable()) {
            (Some(threshold), Some(s)) => s >= threshold,
            _ => true,
        }
    }
}
