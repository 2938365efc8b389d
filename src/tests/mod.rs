// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpful things for tests.

use std::{
    cell::RefCell,
    collections::BTreeSet,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    callibrary::OverridePolicy,
    context::Context,
    domain::{Antenna, Field, MeasurementSet, ObservingRun, SpectralWindow},
    storage::Storage,
    tasks::{Executor, JobError, JobRequest, JobRunner},
};

/// Storage that only knows about the tables it's told about. Clones share the
/// same set of tables.
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryStorage {
    tables: Rc<RefCell<BTreeSet<PathBuf>>>,
}

impl InMemoryStorage {
    pub(crate) fn with_tables<'a, I: IntoIterator<Item = &'a str>>(tables: I) -> InMemoryStorage {
        let storage = InMemoryStorage::default();
        for t in tables {
            storage.insert(t);
        }
        storage
    }

    pub(crate) fn insert<P: Into<PathBuf>>(&self, table: P) {
        self.tables.borrow_mut().insert(table.into());
    }
}

impl Storage for InMemoryStorage {
    fn exists(&self, path: &Path) -> bool {
        self.tables.borrow().contains(path)
    }
}

/// A runner that remembers every job it ran. Jobs with a "caltable" argument
/// "produce" that table, unless the runner was told not to.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingRunner {
    pub(crate) jobs: Rc<RefCell<Vec<JobRequest>>>,
    pub(crate) storage: InMemoryStorage,
    pub(crate) produce_tables: bool,
    pub(crate) fail_task: Option<String>,
}

impl RecordingRunner {
    pub(crate) fn new(storage: InMemoryStorage) -> RecordingRunner {
        RecordingRunner {
            jobs: Rc::default(),
            storage,
            produce_tables: true,
            fail_task: None,
        }
    }

    pub(crate) fn job_names(&self) -> Vec<String> {
        self.jobs
            .borrow()
            .iter()
            .map(|j| j.task().to_string())
            .collect()
    }
}

impl JobRunner for RecordingRunner {
    fn run(&mut self, job: &JobRequest) -> Result<Option<String>, JobError> {
        self.jobs.borrow_mut().push(job.clone());
        if self.fail_task.as_deref() == Some(job.task()) {
            return Err(JobError::Failed {
                job: job.to_string(),
                reason: "told to fail".to_string(),
            });
        }
        if self.produce_tables {
            if let Some(caltable) = job.get_str("caltable") {
                self.storage.insert(caltable);
            }
        }
        Ok(None)
    }
}

/// A measurement set with 4 antennas and two spectral windows (17 for the
/// bandpass calibrator, 19 for the phase calibrator).
pub(crate) fn test_ms() -> MeasurementSet {
    let mut ms = MeasurementSet::new("a.ms");
    ms.antennas = (0..4)
        .map(|id| Antenna {
            id,
            name: format!("DA4{id}"),
        })
        .collect();
    ms.spectral_windows = vec![
        SpectralWindow {
            id: 17,
            num_channels: 128,
            intents: ["BANDPASS".to_string()].into(),
        },
        SpectralWindow {
            id: 19,
            num_channels: 128,
            intents: ["PHASE".to_string()].into(),
        },
    ];
    ms.fields = vec![Field {
        id: 0,
        name: "J1924-2914".to_string(),
        intents: ["BANDPASS".to_string(), "PHASE".to_string()].into(),
    }];
    ms
}

pub(crate) fn test_context() -> Context {
    let mut run = ObservingRun::default();
    run.add_measurement_set(test_ms()).unwrap();
    Context::new(PathBuf::from("out"), run, OverridePolicy::default())
}

/// An executor over [`test_context`] with a [`RecordingRunner`]. The runner
/// and storage are returned so that tests can inspect them.
pub(crate) fn test_executor() -> (Executor, RecordingRunner, InMemoryStorage) {
    let storage = InMemoryStorage::default();
    let runner = RecordingRunner::new(storage.clone());
    let executor = Executor::new(
        test_context(),
        Box::new(runner.clone()),
        Box::new(storage.clone()),
    );
    (executor, runner, storage)
}
