// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The calibration library.
//!
//! A calibration library records which calibration tables exist and which
//! subset of the observed data each one applies to. A [`CalTo`] selects data
//! (visibility set, spectral windows, fields, antennas, intents), a
//! [`CalFrom`] describes how to apply one table, and a [`CalApplication`]
//! binds one selector to an ordered list of tables.
//!
//! Applications are first added to a *pool* of candidates. They only affect
//! resolution once *activated*, and activation requires every backing table
//! to exist. With the default [`OverridePolicy::LastActivatedWins`],
//! activating an application shadows every active application whose selector
//! is a subset of the new one; shadowed applications are kept for auditing,
//! but are never resolved again.

mod error;

pub use error::CalLibraryError;

use std::{
    collections::BTreeSet,
    fmt,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use vec1::Vec1;

use crate::{constants::DEFAULT_CAL_INTERP, storage::Storage};

/// The kinds of calibration table known to the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CalType {
    Antpos,
    Bandpass,
    Gaincal,
    Gc,
    Opac,
    Polarization,
    Rq,
    Swpow,
    Tsys,
    Wvr,
}

/// Selects a subset of the observed data. Empty sets (and an absent
/// visibility set) are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalTo {
    #[serde(default)]
    vis: Option<String>,

    #[serde(default)]
    spw: BTreeSet<u32>,

    #[serde(default)]
    field: BTreeSet<u32>,

    #[serde(default)]
    antenna: BTreeSet<u32>,

    #[serde(default)]
    intent: BTreeSet<String>,
}

impl CalTo {
    /// A selector for all data in `vis` (or all data everywhere if `vis` is
    /// `None`). Narrow it with the `with_*` methods.
    pub fn new(vis: Option<&str>) -> CalTo {
        CalTo {
            vis: vis.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    pub fn with_spws<I: IntoIterator<Item = u32>>(mut self, spws: I) -> CalTo {
        self.spw.extend(spws);
        self
    }

    pub fn with_fields<I: IntoIterator<Item = u32>>(mut self, fields: I) -> CalTo {
        self.field.extend(fields);
        self
    }

    pub fn with_antennas<I: IntoIterator<Item = u32>>(mut self, antennas: I) -> CalTo {
        self.antenna.extend(antennas);
        self
    }

    pub fn with_intents<I, S>(mut self, intents: I) -> CalTo
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intent.extend(intents.into_iter().map(|s| s.into()));
        self
    }

    pub fn vis(&self) -> Option<&str> {
        self.vis.as_deref()
    }

    pub fn spw(&self) -> &BTreeSet<u32> {
        &self.spw
    }

    pub fn field(&self) -> &BTreeSet<u32> {
        &self.field
    }

    pub fn antenna(&self) -> &BTreeSet<u32> {
        &self.antenna
    }

    pub fn intent(&self) -> &BTreeSet<String> {
        &self.intent
    }

    /// Does this selector match the concrete data coordinates?
    pub fn matches(&self, vis: &str, spw: u32, field: u32, antenna: u32, intent: &str) -> bool {
        self.vis.as_deref().map_or(true, |v| v == vis)
            && (self.spw.is_empty() || self.spw.contains(&spw))
            && (self.field.is_empty() || self.field.contains(&field))
            && (self.antenna.is_empty() || self.antenna.contains(&antenna))
            && (self.intent.is_empty() || self.intent.contains(intent))
    }

    /// Is every piece of data selected by `self` also selected by `other`?
    pub fn is_subset_of(&self, other: &CalTo) -> bool {
        fn dim_subset<T: Ord>(narrow: &BTreeSet<T>, broad: &BTreeSet<T>) -> bool {
            broad.is_empty() || (!narrow.is_empty() && narrow.is_subset(broad))
        }

        let vis_subset = match (&self.vis, &other.vis) {
            (_, None) => true,
            (Some(a), Some(b)) => a == b,
            (None, Some(_)) => false,
        };

        vis_subset
            && dim_subset(&self.spw, &other.spw)
            && dim_subset(&self.field, &other.field)
            && dim_subset(&self.antenna, &other.antenna)
            && dim_subset(&self.intent, &other.intent)
    }
}

impl fmt::Display for CalTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalTo(vis='{}', spw='{}', field='{}', antenna='{}', intent='{}')",
            self.vis.as_deref().unwrap_or(""),
            self.spw.iter().join(","),
            self.field.iter().join(","),
            self.antenna.iter().join(","),
            self.intent.iter().join(","),
        )
    }
}

fn default_interp() -> String {
    DEFAULT_CAL_INTERP.to_string()
}

/// How to apply one calibration table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalFrom {
    gaintable: PathBuf,

    caltype: CalType,

    /// Maps the spectral windows of the data onto the spectral windows of the
    /// table. Empty means identity.
    #[serde(default)]
    spwmap: Vec<i32>,

    /// The interpolation mode, e.g. "linear" or "nearest". A frequency
    /// interpolation can follow after a comma.
    #[serde(default = "default_interp")]
    interp: String,

    /// Should the weights be calibrated too?
    #[serde(default)]
    calwt: bool,
}

impl CalFrom {
    pub fn new<P: Into<PathBuf>>(
        gaintable: P,
        caltype: CalType,
        spwmap: Vec<i32>,
        interp: &str,
        calwt: bool,
    ) -> CalFrom {
        CalFrom {
            gaintable: gaintable.into(),
            caltype,
            spwmap,
            interp: interp.to_string(),
            calwt,
        }
    }

    pub fn gaintable(&self) -> &Path {
        &self.gaintable
    }

    pub fn caltype(&self) -> CalType {
        self.caltype
    }

    pub fn spwmap(&self) -> &[i32] {
        &self.spwmap
    }

    pub fn interp(&self) -> &str {
        &self.interp
    }

    pub fn calwt(&self) -> bool {
        self.calwt
    }
}

impl fmt::Display for CalFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalFrom('{}', caltype='{}', spwmap=[{}], interp='{}', calwt={})",
            self.gaintable.display(),
            self.caltype,
            self.spwmap.iter().join(","),
            self.interp,
            self.calwt
        )
    }
}

/// "When data matches `calto`, apply the tables in `calfrom`, in order."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalApplication {
    calto: CalTo,
    calfrom: Vec1<CalFrom>,
}

impl CalApplication {
    pub fn new(calto: CalTo, calfrom: Vec1<CalFrom>) -> CalApplication {
        CalApplication { calto, calfrom }
    }

    /// Convenience for the common single-table case.
    pub fn single(calto: CalTo, calfrom: CalFrom) -> CalApplication {
        CalApplication {
            calto,
            calfrom: Vec1::new(calfrom),
        }
    }

    pub fn calto(&self) -> &CalTo {
        &self.calto
    }

    pub fn calfrom(&self) -> &Vec1<CalFrom> {
        &self.calfrom
    }

    /// The tables backing this application.
    pub fn gaintables(&self) -> impl Iterator<Item = &Path> {
        self.calfrom.iter().map(|c| c.gaintable())
    }

    /// The first backing table that `storage` says doesn't exist, if any.
    pub fn missing_table(&self, storage: &dyn Storage) -> Option<&Path> {
        self.gaintables().find(|t| !storage.exists(t))
    }

    /// Do all of the backing tables exist?
    pub fn exists(&self, storage: &dyn Storage) -> bool {
        self.missing_table(storage).is_none()
    }
}

impl fmt::Display for CalApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}]", self.calto, self.calfrom.iter().join(", "))
    }
}

/// How overlapping selectors are resolved.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OverridePolicy {
    /// A newly activated application shadows every active application whose
    /// selector is a subset of its own.
    #[default]
    LastActivatedWins,

    /// Nothing is shadowed at activation. When resolving, a matching
    /// application is skipped if another matching application has a
    /// strictly narrower selector.
    MostSpecificWins,
}

#[derive(Debug, Clone, PartialEq)]
struct ActiveEntry {
    calapp: CalApplication,

    /// The index of the entry that shadowed this one.
    shadowed_by: Option<usize>,
}

/// The set of candidate and active calibration applications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalLibrary {
    pool: Vec<CalApplication>,

    /// Active entries in activation order, including shadowed ones.
    entries: Vec<ActiveEntry>,

    policy: OverridePolicy,
}

impl CalLibrary {
    pub fn new(policy: OverridePolicy) -> CalLibrary {
        CalLibrary {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> OverridePolicy {
        self.policy
    }

    /// Add a candidate application. This doesn't affect resolution.
    pub fn add(&mut self, calapp: CalApplication) {
        trace!("Adding {calapp} to the calibration pool");
        self.pool.push(calapp);
    }

    /// Make an application available for resolution. Fails if any of its
    /// tables don't exist, in which case the library is unchanged.
    pub fn activate(
        &mut self,
        calapp: CalApplication,
        storage: &dyn Storage,
    ) -> Result<(), CalLibraryError> {
        if let Some(table) = calapp.missing_table(storage) {
            return Err(CalLibraryError::NotFound {
                table: table.to_path_buf(),
                calto: calapp.calto.to_string(),
            });
        }

        self.insert_active(calapp);
        Ok(())
    }

    fn insert_active(&mut self, calapp: CalApplication) {
        let new_index = self.entries.len();
        if self.policy == OverridePolicy::LastActivatedWins {
            for entry in self
                .entries
                .iter_mut()
                .filter(|e| e.shadowed_by.is_none())
                .filter(|e| e.calapp.calto.is_subset_of(&calapp.calto))
            {
                debug!("{} is shadowed by {}", entry.calapp, calapp.calto);
                entry.shadowed_by = Some(new_index);
            }
        }
        debug!("Activated {calapp}");
        self.entries.push(ActiveEntry {
            calapp,
            shadowed_by: None,
        });
    }

    /// Get the calibration tables to apply to the data with the given
    /// coordinates, in the order they should be applied. An empty list means
    /// that no calibration applies.
    pub fn get_applicable(
        &self,
        vis: &str,
        spw: u32,
        field: u32,
        antenna: u32,
        intent: &str,
    ) -> Vec<CalFrom> {
        let matching = self
            .active()
            .filter(|c| c.calto.matches(vis, spw, field, antenna, intent))
            .collect::<Vec<_>>();

        let selected = match self.policy {
            OverridePolicy::LastActivatedWins => matching,
            OverridePolicy::MostSpecificWins => matching
                .iter()
                .filter(|a| {
                    !matching
                        .iter()
                        .any(|b| b.calto != a.calto && b.calto.is_subset_of(&a.calto))
                })
                .copied()
                .collect(),
        };

        selected
            .into_iter()
            .flat_map(|c| c.calfrom.iter().cloned())
            .collect()
    }

    /// The applications that can be resolved, in activation order.
    pub fn active(&self) -> impl Iterator<Item = &CalApplication> {
        self.entries
            .iter()
            .filter(|e| e.shadowed_by.is_none())
            .map(|e| &e.calapp)
    }

    /// Applications that were activated but later shadowed, paired with the
    /// application that shadowed them.
    pub fn shadowed(&self) -> impl Iterator<Item = (&CalApplication, &CalApplication)> {
        self.entries.iter().filter_map(|e| {
            e.shadowed_by
                .map(|i| (&e.calapp, &self.entries[i].calapp))
        })
    }

    /// Every application ever added as a candidate.
    pub fn pool(&self) -> &[CalApplication] {
        &self.pool
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty() && self.entries.is_empty()
    }

    /// Forget everything, but keep the override policy.
    pub fn clear(&mut self) {
        self.pool.clear();
        self.entries.clear();
    }

    /// Combine two libraries. `other`'s activations are replayed after
    /// `self`'s, so `other` takes precedence where selectors overlap.
    /// Applications already active in `self` aren't activated twice. The
    /// existence of `other`'s tables has already been checked, so it isn't
    /// checked again.
    pub fn merge(&self, other: &CalLibrary) -> CalLibrary {
        let mut merged = self.clone();
        for calapp in &other.pool {
            if !merged.pool.contains(calapp) {
                merged.pool.push(calapp.clone());
            }
        }

        for entry in &other.entries {
            let already_active = merged.active().any(|c| c == &entry.calapp);
            if already_active {
                trace!("{} is already active; not merging it", entry.calapp);
                continue;
            }
            merged.insert_active(entry.calapp.clone());

            // If whatever shadowed this entry in `other` was skipped above
            // (because `self` already had it), shadow it here.
            if let Some(shadower) = entry.shadowed_by.map(|i| &other.entries[i].calapp) {
                let existing = merged
                    .entries
                    .iter()
                    .position(|e| e.shadowed_by.is_none() && &e.calapp == shadower);
                if let (Some(i), Some(last)) = (existing, merged.entries.last_mut()) {
                    last.shadowed_by = Some(i);
                }
            }
        }

        merged
    }
}
