// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Two-dimensional views of data, e.g. gain amplitude per antenna and time.

use indexmap::IndexMap;
use log::warn;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

use super::{FlagCommand, ViewError};
use crate::{qa::QAScorePool, tasks::TaskResults};

/// One axis of a view. `values` holds the coordinate of each row (or column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultAxis {
    pub name: String,
    #[serde(default)]
    pub units: String,
    pub values: Vec<f64>,
}

impl ResultAxis {
    pub fn new(name: &str, units: &str, values: Vec<f64>) -> ResultAxis {
        ResultAxis {
            name: name.to_string(),
            units: units.to_string(),
            values,
        }
    }
}

/// A 2D array of data with a flag for each value. Rows follow the first axis,
/// columns the second.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageView {
    filename: String,
    datatype: String,
    spw: Option<u32>,
    intent: Option<String>,
    axes: [ResultAxis; 2],
    data: Array2<f64>,
    flag: Array2<bool>,
}

impl ImageView {
    pub fn new(
        filename: &str,
        datatype: &str,
        axes: [ResultAxis; 2],
        data: Array2<f64>,
        flag: Array2<bool>,
    ) -> Result<ImageView, ViewError> {
        let expected = (axes[0].values.len(), axes[1].values.len());
        for (what, got) in [("data", data.dim()), ("flag", flag.dim())] {
            if got != expected {
                return Err(ViewError::ShapeMismatch {
                    view: filename.to_string(),
                    what,
                    expected,
                    got,
                });
            }
        }

        Ok(ImageView {
            filename: filename.to_string(),
            datatype: datatype.to_string(),
            spw: None,
            intent: None,
            axes,
            data,
            flag,
        })
    }

    pub fn with_spw(mut self, spw: u32) -> ImageView {
        self.spw = Some(spw);
        self
    }

    pub fn with_intent(mut self, intent: &str) -> ImageView {
        self.intent = Some(intent.to_string());
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    pub fn spw(&self) -> Option<u32> {
        self.spw
    }

    pub fn intent(&self) -> Option<&str> {
        self.intent.as_deref()
    }

    pub fn axes(&self) -> &[ResultAxis; 2] {
        &self.axes
    }

    pub fn data(&self) -> ArrayView2<f64> {
        self.data.view()
    }

    pub fn flag(&self) -> ArrayView2<bool> {
        self.flag.view()
    }

    pub fn num_flagged(&self) -> usize {
        self.flag.iter().filter(|&&f| f).count()
    }

    /// Identifies this view; views from successive iterations of a flagger
    /// with the same description are the same view.
    pub fn description(&self) -> String {
        let mut s = format!("{} {}", self.datatype, self.filename);
        if let Some(spw) = self.spw {
            s.push_str(&format!(" spw {spw}"));
        }
        if let Some(intent) = &self.intent {
            s.push_str(&format!(" intent {intent}"));
        }
        s
    }

    /// Flag everything that's flagged in `other`. Nothing happens if the views
    /// don't have the same axes.
    pub(crate) fn merge_flags(&mut self, other: &ImageView) {
        if self.axes != other.axes {
            warn!(
                "The axes of '{}' changed between iterations; not carrying flags over",
                self.description()
            );
            return;
        }
        self.flag.zip_mut_with(&other.flag, |a, &b| *a |= b);
    }

    pub(crate) fn set_flag(&mut self, row: usize, col: usize) {
        self.flag[(row, col)] = true;
    }

    /// Whether a command is meant for this view at all.
    fn is_targeted_by(&self, cmd: &FlagCommand) -> bool {
        (cmd.filename().is_empty() || cmd.filename() == self.filename)
            && cmd.spw().map_or(true, |s| self.spw.map_or(true, |v| v == s))
            && cmd
                .intent()
                .map_or(true, |i| self.intent.as_deref().map_or(true, |v| v == i))
    }

    /// Flag the cells selected by `cmd`. Returns the number of cells that
    /// weren't already flagged, so applying a command twice does nothing the
    /// second time.
    pub fn apply_flag_command(&mut self, cmd: &FlagCommand) -> usize {
        if !self.is_targeted_by(cmd) {
            return 0;
        }
        let [rows, cols] = &self.axes;
        let mut num_new = 0;
        for (i_row, row_value) in rows.values.iter().enumerate() {
            for (i_col, col_value) in cols.values.iter().enumerate() {
                if cmd.covers((rows.name.as_str(), *row_value), (cols.name.as_str(), *col_value))
                    && !self.flag[(i_row, i_col)]
                {
                    self.flag[(i_row, i_col)] = true;
                    num_new += 1;
                }
            }
        }
        num_new
    }
}

/// The results of a task that computes views.
#[derive(Debug, Default)]
pub struct ViewResults {
    task: String,
    views: IndexMap<String, ImageView>,
    qa: QAScorePool,
}

impl ViewResults {
    pub fn new(task: &str) -> ViewResults {
        ViewResults {
            task: task.to_string(),
            ..Default::default()
        }
    }

    /// Add a view, keyed by its description. A view with the same description
    /// is replaced.
    pub fn add_view(&mut self, view: ImageView) {
        self.views.insert(view.description(), view);
    }

    pub fn views(&self) -> &IndexMap<String, ImageView> {
        &self.views
    }

    pub fn into_views(self) -> IndexMap<String, ImageView> {
        self.views
    }
}

impl TaskResults for ViewResults {
    fn task_name(&self) -> &str {
        &self.task
    }

    fn qa(&self) -> &QAScorePool {
        &self.qa
    }

    fn qa_mut(&mut self) -> &mut QAScorePool {
        &mut self.qa
    }
}
