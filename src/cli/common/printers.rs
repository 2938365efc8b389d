// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tree-shaped summaries of libraries, views and flagging results, and the
//! warnings collected while arguments are parsed.

use std::{
    borrow::Cow,
    sync::{Mutex, PoisonError},
};

use log::{info, warn};

lazy_static::lazy_static! {
    static ref WARNINGS: Mutex<Vec<Cow<'static, str>>> = Mutex::new(vec![]);
}

/// Lay out blocks of lines under a tree. The first line of each block hangs
/// off the tree; the rest of the block is indented beneath it.
fn render_tree(blocks: &[Vec<Cow<'static, str>>]) -> Vec<String> {
    let mut lines = vec![];
    for (i_block, block) in blocks.iter().enumerate() {
        let last_block = i_block + 1 == blocks.len();
        let (branch, trunk) = if last_block { ('└', ' ') } else { ('├', '│') };
        for (i_line, line) in block.iter().enumerate() {
            if i_line == 0 {
                lines.push(format!("{branch} {line}"));
            } else {
                lines.push(format!("{trunk}   {line}"));
            }
        }
    }
    lines
}

/// A titled summary, logged at the info level.
pub(crate) struct InfoPrinter {
    title: Cow<'static, str>,
    blocks: Vec<Vec<Cow<'static, str>>>,
}

impl InfoPrinter {
    pub(crate) fn new(title: Cow<'static, str>) -> Self {
        Self {
            title,
            blocks: vec![],
        }
    }

    pub(crate) fn push_line(&mut self, line: Cow<'static, str>) {
        self.blocks.push(vec![line]);
    }

    /// Lines that belong together, e.g. the CalFroms of one application.
    /// Empty blocks are dropped.
    pub(crate) fn push_block(&mut self, block: Vec<Cow<'static, str>>) {
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    fn lines(&self) -> Vec<String> {
        render_tree(&self.blocks)
    }

    pub(crate) fn display(self) {
        info!("{}", console::style(&self.title).bold());
        for line in self.lines() {
            info!("{line}");
        }
        info!("");
    }
}

/// Something to tell the user about once argument parsing is done.
pub(crate) trait Warn {
    fn warn(self);
}

impl<T: Into<Cow<'static, str>>> Warn for T {
    fn warn(self) {
        WARNINGS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.into());
    }
}

/// Log any warnings collected while arguments were parsed into parameters,
/// then forget them.
pub(crate) fn display_warnings() {
    let warnings = std::mem::take(&mut *WARNINGS.lock().unwrap_or_else(PoisonError::into_inner));
    if warnings.is_empty() {
        return;
    }
    let blocks = warnings.into_iter().map(|w| vec![w]).collect::<Vec<_>>();
    warn!("{}", console::style("Warnings").bold());
    for line in render_tree(&blocks) {
        warn!("{line}");
    }
    warn!("");
}
