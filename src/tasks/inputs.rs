// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpers for parsing the loosely-typed arguments users give to tasks.

use std::collections::BTreeSet;

use itertools::Itertools;

use super::InputsError;
use crate::constants::MAX_ID_RANGE_LEN;

/// Split a comma-separated argument, trimming whitespace and dropping empty
/// entries.
pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_string())
        .collect()
}

/// Parse a comma-separated list of IDs. Ranges like "2~5" are inclusive.
pub fn parse_ids(name: &'static str, s: &str) -> Result<BTreeSet<u32>, InputsError> {
    let invalid = |reason: String| InputsError::Invalid {
        name,
        value: s.to_string(),
        reason,
    };

    let mut ids = BTreeSet::new();
    for entry in split_csv(s) {
        match entry.split_once('~') {
            Some((start, end)) => {
                let start: u32 = start
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{start}' is not an ID")))?;
                let end: u32 = end
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{end}' is not an ID")))?;
                if end < start {
                    return Err(invalid(format!("the range {entry} is backwards")));
                }
                if end - start >= MAX_ID_RANGE_LEN {
                    return Err(invalid(format!(
                        "the range {entry} has more than {MAX_ID_RANGE_LEN} IDs"
                    )));
                }
                ids.extend(start..=end);
            }
            None => {
                let id = entry
                    .parse()
                    .map_err(|_| invalid(format!("'{entry}' is not an ID")))?;
                ids.insert(id);
            }
        }
    }
    Ok(ids)
}

/// Render IDs the way [`parse_ids`] reads them.
pub fn format_ids<'a, I: IntoIterator<Item = &'a u32>>(ids: I) -> String {
    ids.into_iter().join(",")
}

/// Intents are often given with wildcards, e.g. "*BANDPASS*"; `calpipe`
/// always matches intents exactly.
pub fn strip_intent_wildcards(intent: &str) -> String {
    intent.replace('*', "")
}
