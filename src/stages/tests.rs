// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    cell::RefCell,
    path::{Path, PathBuf},
    rc::Rc,
};

use approx::assert_abs_diff_eq;

use super::*;
use crate::{
    caltable::{CalTableError, CalTableReader, CalTableRow},
    context::MergeOutcome,
    flagging::{FlagRule, StopReason},
    qa::{standard_registry, QaGate},
    tasks::{Executor, InputsError, JobArg, Task, TaskError, TaskResults},
    tests::{test_context, test_executor, InMemoryStorage, RecordingRunner},
};

/// Gain amplitudes of 1 for antennas 0-3 at 4 times in spw 17, except for
/// antenna 1 at the last time.
struct FixedReader {
    rows: Vec<CalTableRow>,
    reads: RefCell<Vec<PathBuf>>,
}

impl FixedReader {
    fn new() -> FixedReader {
        let mut rows = vec![];
        for antenna in 0..4 {
            for time in [10.0, 20.0, 30.0, 40.0] {
                rows.push(CalTableRow {
                    antenna,
                    spw: 17,
                    time,
                    amplitude: if antenna == 1 && time == 40.0 { 0.1 } else { 1.0 },
                    flagged: false,
                });
            }
        }
        FixedReader::with_rows(rows)
    }

    fn with_rows(rows: Vec<CalTableRow>) -> FixedReader {
        FixedReader {
            rows,
            reads: RefCell::default(),
        }
    }
}

impl CalTableReader for FixedReader {
    fn read(&self, table: &Path) -> Result<Vec<CalTableRow>, CalTableError> {
        self.reads.borrow_mut().push(table.to_path_buf());
        Ok(self.rows.clone())
    }
}

#[test]
fn test_gaincal_args_defaults() {
    let context = test_context();
    let params = GaincalArgs::default().parse(&context).unwrap();
    assert_eq!(params.vis, "a.ms");
    assert_eq!(params.intent, "PHASE");
    assert_eq!(params.spw.iter().copied().collect::<Vec<_>>(), vec![19]);
    assert_eq!(params.calmode, "ap");
    assert_eq!(params.solint, "int");
    assert_eq!(params.gaintype, "G");
    assert_abs_diff_eq!(params.minsnr, 3.0);
    assert_eq!(params.interp, "linear");
    assert_eq!(params.caltable, PathBuf::from("out/a.ms.s0.gaincal.ap.int.tbl"));
}

#[test]
fn test_gaincal_args_validation() {
    let context = test_context();

    let args = GaincalArgs {
        calmode: Some("k".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        args.parse(&context),
        Err(InputsError::Invalid { name: "calmode", .. })
    ));

    let args = GaincalArgs {
        spw: Some("18".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        args.parse(&context),
        Err(InputsError::Invalid { name: "spw", .. })
    ));

    let args = GaincalArgs {
        intent: Some("*TARGET*".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        args.parse(&context),
        Err(InputsError::Invalid { name: "intent", .. })
    ));

    let args = GaincalArgs {
        vis: Some("b.ms".to_string()),
        ..Default::default()
    };
    assert!(matches!(args.parse(&context), Err(InputsError::Catalog(_))));
}

#[test]
fn test_gaincal_merges_its_table() {
    let (executor, runner, _) = test_executor();
    let mut executor = executor.with_qa(standard_registry());
    let results = executor
        .execute(&mut Gaincal::new(GaincalArgs::default()), true)
        .unwrap();

    let jobs = runner.jobs.borrow();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].task(), "gaincal");
    assert_eq!(jobs[0].get_str("spw"), Some("19"));
    assert_eq!(jobs[0].get("minsnr"), Some(&JobArg::Float(3.0)));

    let table = Path::new("out/a.ms.s1.gaincal.ap.int.tbl");
    let applicable = executor
        .context()
        .callibrary
        .get_applicable("a.ms", 19, 0, 2, "PHASE");
    assert_eq!(applicable.len(), 1);
    assert_eq!(applicable[0].gaintable(), table);
    assert!(executor
        .context()
        .callibrary
        .get_applicable("a.ms", 17, 0, 2, "BANDPASS")
        .is_empty());

    let qa = results.qa().representative();
    assert_abs_diff_eq!(qa.score.unwrap(), 1.0);
    assert_eq!(qa.target.vis.as_deref(), Some("a.ms"));
}

#[test]
fn test_gaincal_missing_table_fails_qa() {
    let storage = InMemoryStorage::default();
    let mut runner = RecordingRunner::new(storage.clone());
    runner.produce_tables = false;
    let mut executor = Executor::new(test_context(), Box::new(runner), Box::new(storage))
        .with_qa(standard_registry())
        .with_gate(QaGate::new(Some(0.5)));

    let results = executor
        .execute(&mut Gaincal::new(GaincalArgs::default()), true)
        .unwrap();
    assert_eq!(results.calapps().errors().len(), 1);
    assert_abs_diff_eq!(results.qa().representative().score.unwrap(), 0.0);
    assert_eq!(
        executor.context().history()[0].outcome,
        MergeOutcome::RejectedByQa
    );
    assert!(executor.context().callibrary.is_empty());
}

#[test]
fn test_lowgainflag_args_defaults() {
    let context = test_context();
    let params = LowgainflagArgs::default().parse(&context).unwrap();
    assert_eq!(params.intent, "BANDPASS");
    assert_eq!(params.niter, 1);
    assert_eq!(params.spw.len(), 2);
    assert_eq!(
        params.rules,
        vec![FlagRule::Nmedian {
            limit: 0.5,
            minsample: 3
        }]
    );

    let params = LowgainflagArgs {
        flag_nmedian: Some(false),
        ..Default::default()
    }
    .parse(&context)
    .unwrap();
    assert!(params.rules.is_empty());
}

#[test]
fn test_lowgainflag_flags_the_low_gain() {
    let (executor, runner, _) = test_executor();
    let mut executor = executor.with_qa(standard_registry());
    let reader = Rc::new(FixedReader::new());
    let mut stage = Lowgainflag::new(
        LowgainflagArgs {
            spw: Some("17".to_string()),
            niter: Some(2),
            ..Default::default()
        },
        reader.clone(),
    );

    let results = executor.execute(&mut stage, false).unwrap();
    assert!(results.converged);
    assert_eq!(results.iterations, 2);
    assert_eq!(results.task_name(), "lowgainflag");
    assert_eq!(
        runner.job_names(),
        vec!["gaincal", "flagdata", "gaincal"]
    );
    assert_eq!(reader.reads.borrow().len(), 2);

    let jobs = runner.jobs.borrow();
    assert_eq!(jobs[1].get_str("vis"), Some("a.ms"));
    assert_eq!(
        jobs[1].get("inpfile"),
        Some(&JobArg::List(vec![
            "mode='manual' antenna='1' timerange='40' spw='17' intent='BANDPASS' reason='nmedian'"
                .to_string()
        ]))
    );

    let (_, flagged) = results.views.get_index(0).unwrap();
    assert_eq!(flagged.view.num_flagged(), 1);
    assert_eq!(flagged.view.axes()[0].values, vec![0.0, 1.0, 2.0, 3.0]);

    // The gain table solved for along the way is available to later stages.
    assert_eq!(
        executor
            .context()
            .callibrary
            .get_applicable("a.ms", 17, 0, 0, "BANDPASS")
            .len(),
        1
    );
    // 1 of 16 values flagged.
    assert_abs_diff_eq!(
        results.qa().representative().score.unwrap(),
        15.0 / 16.0
    );
}

#[test]
fn test_lowgainflag_view_rows_are_the_known_antennas() {
    // Antenna 1000 isn't in the catalog, and antennas 1 and 3 have no
    // solutions.
    let rows = [0, 2, 1000]
        .into_iter()
        .flat_map(|antenna| {
            [10.0, 20.0, 30.0].map(|time| CalTableRow {
                antenna,
                spw: 17,
                time,
                amplitude: 1.0,
                flagged: false,
            })
        })
        .collect();
    let (mut executor, _, _) = test_executor();
    let mut stage = Lowgainflag::new(
        LowgainflagArgs {
            spw: Some("17".to_string()),
            ..Default::default()
        },
        Rc::new(FixedReader::with_rows(rows)),
    );

    let results = executor.execute(&mut stage, false).unwrap();
    assert!(results.converged);
    let (_, flagged) = results.views.get_index(0).unwrap();
    assert_eq!(
        flagged.view.axes()[0].values,
        vec![0.0, 1.0, 2.0, 3.0, 1000.0]
    );
    assert_eq!(flagged.view.flag().dim(), (5, 3));
    // Only the antennas without solutions are flagged.
    assert_eq!(flagged.view.num_flagged(), 6);
    assert!(flagged.view.flag().row(4).iter().all(|&f| !f));
    assert!(flagged.view.flag().row(1).iter().all(|&f| f));
}

#[test]
fn test_lowgainflag_hits_the_iteration_limit() {
    let (mut executor, _, _) = test_executor();
    let mut stage = Lowgainflag::new(
        LowgainflagArgs {
            spw: Some("17".to_string()),
            ..Default::default()
        },
        Rc::new(FixedReader::new()),
    );
    let results = executor.execute(&mut stage, false).unwrap();
    assert!(!results.converged);
    assert_eq!(results.stop_reason, StopReason::IterationLimit);
    assert_eq!(results.iterations, 1);
}

#[test]
fn test_lowgainflag_dry_run() {
    let (executor, runner, _) = test_executor();
    let mut executor = executor.with_dry_run(true);
    let reader = Rc::new(FixedReader::new());
    let mut stage = Lowgainflag::new(LowgainflagArgs::default(), reader.clone());

    let results = executor.execute(&mut stage, false).unwrap();
    assert!(runner.jobs.borrow().is_empty());
    assert!(reader.reads.borrow().is_empty());
    assert!(results.converged);
    assert!(results.views.is_empty());
}

#[test]
fn test_lowgainflag_needs_a_gain_table() {
    let storage = InMemoryStorage::default();
    let mut runner = RecordingRunner::new(storage.clone());
    runner.produce_tables = false;
    let mut executor = Executor::new(test_context(), Box::new(runner), Box::new(storage));
    let mut stage = Lowgainflag::new(LowgainflagArgs::default(), Rc::new(FixedReader::new()));
    assert!(matches!(
        executor.execute(&mut stage, false),
        Err(TaskError::Verification { .. })
    ));
}

#[test]
fn test_stages_are_tasks() {
    fn name<T: Task>(t: &T) -> &'static str {
        t.name()
    }
    assert_eq!(name(&Gaincal::new(GaincalArgs::default())), "gaincal");
}
