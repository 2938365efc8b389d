// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The data being reduced: measurement sets, and the observing run that
//! collects them.

mod error;

pub use error::CatalogError;

use std::collections::BTreeSet;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

const SCIENCE_INTENTS: [&str; 4] = ["BANDPASS", "AMPLITUDE", "PHASE", "TARGET"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Antenna {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralWindow {
    pub id: u32,
    #[serde(default)]
    pub num_channels: u32,
    /// The scan intents observed with this window, e.g. "BANDPASS".
    #[serde(default)]
    pub intents: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub intents: BTreeSet<String>,
}

/// What `calpipe` knows about a measurement set. Only metadata lives here; the
/// visibilities themselves are only ever touched by external jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSet {
    pub name: String,
    #[serde(default)]
    pub antennas: Vec<Antenna>,
    #[serde(default)]
    pub spectral_windows: Vec<SpectralWindow>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl MeasurementSet {
    pub fn new(name: &str) -> MeasurementSet {
        MeasurementSet {
            name: name.to_string(),
            antennas: vec![],
            spectral_windows: vec![],
            fields: vec![],
        }
    }

    /// The file name of the measurement set, without any leading directories.
    pub fn basename(&self) -> &str {
        Path::new(&self.name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.name)
    }

    /// All intents observed in this measurement set.
    pub fn intents(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .flat_map(|f| f.intents.iter())
            .chain(self.spectral_windows.iter().flat_map(|s| s.intents.iter()))
            .map(|s| s.as_str())
            .collect()
    }

    /// Spectral windows that have data for the given intent. An empty intent
    /// selects every window.
    pub fn spectral_windows_for_intent(&self, intent: &str) -> Vec<&SpectralWindow> {
        self.spectral_windows
            .iter()
            .filter(|s| intent.is_empty() || s.intents.contains(intent))
            .collect()
    }

    /// Windows carrying science data: not channel-averaged or water-vapour
    /// radiometer windows (1 or 4 channels), and observed for a calibrator or
    /// the target.
    pub fn science_spw_ids(&self) -> Vec<u32> {
        self.spectral_windows
            .iter()
            .filter(|s| !matches!(s.num_channels, 1 | 4))
            .filter(|s| {
                SCIENCE_INTENTS
                    .iter()
                    .any(|&i| s.intents.contains(i))
            })
            .map(|s| s.id)
            .collect()
    }

    pub fn get_antenna(&self, id: u32) -> Option<&Antenna> {
        self.antennas.iter().find(|a| a.id == id)
    }

    fn has_field(&self, name_or_id: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.name == name_or_id || f.id.to_string() == name_or_id)
    }
}

/// All of the measurement sets being reduced together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservingRun {
    #[serde(default)]
    measurement_sets: Vec<MeasurementSet>,
}

impl ObservingRun {
    pub fn add_measurement_set(&mut self, ms: MeasurementSet) -> Result<(), CatalogError> {
        if self
            .measurement_sets
            .iter()
            .any(|existing| existing.basename() == ms.basename())
        {
            return Err(CatalogError::Duplicate(ms.name));
        }
        debug!("Adding {} to the observing run", ms.name);
        self.measurement_sets.push(ms);
        Ok(())
    }

    pub fn measurement_sets(&self) -> &[MeasurementSet] {
        &self.measurement_sets
    }

    /// Find a measurement set by name (with or without a leading directory or
    /// a trailing ".ms"), or failing that, the first one observed with the
    /// given intent. Wildcards ('*') in the intent are ignored.
    pub fn get_ms(
        &self,
        name: Option<&str>,
        intent: Option<&str>,
    ) -> Result<&MeasurementSet, CatalogError> {
        match (name, intent) {
            (Some(name), _) => {
                let with_ext = format!("{name}.ms");
                self.measurement_sets
                    .iter()
                    .find(|ms| {
                        ms.name == name
                            || ms.basename() == name
                            || ms.name == with_ext
                            || ms.basename() == with_ext
                    })
                    .ok_or_else(|| CatalogError::NoMsWithName(name.to_string()))
            }
            (None, Some(intent)) => {
                let intent = intent.replace('*', "");
                self.measurement_sets
                    .iter()
                    .find(|ms| ms.intents().contains(intent.as_str()))
                    .ok_or(CatalogError::NoMsWithIntent(intent))
            }
            (None, None) => Err(CatalogError::NoIdentifier),
        }
    }

    /// Measurement sets filtered by name, intent and field. Each filter is
    /// skipped if not given; a measurement set passes a filter if it has any
    /// of the listed values.
    pub fn get_measurement_sets(
        &self,
        names: Option<&[&str]>,
        intents: Option<&[&str]>,
        fields: Option<&[&str]>,
    ) -> Vec<&MeasurementSet> {
        self.measurement_sets
            .iter()
            .filter(|ms| {
                names.map_or(true, |names| {
                    names
                        .iter()
                        .any(|n| ms.name == *n || ms.basename() == *n)
                })
            })
            .filter(|ms| {
                intents.map_or(true, |intents| {
                    let ms_intents = ms.intents();
                    intents
                        .iter()
                        .any(|i| ms_intents.contains(i.replace('*', "").as_str()))
                })
            })
            .filter(|ms| fields.map_or(true, |fields| fields.iter().any(|f| ms.has_field(f))))
            .collect()
    }
}
