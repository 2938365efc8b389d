// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{collections::BTreeSet, path::Path};

use super::*;
use crate::{
    callibrary::{CalFrom, CalTo, CalType},
    constants::MAX_ID_RANGE_LEN,
    context::MergeOutcome,
    qa::{QAScore, QaGate},
    tests::{test_context, test_executor, InMemoryStorage, RecordingRunner},
};

#[derive(Debug, Default)]
struct ProduceResults {
    calapps: CalAppPool,
    jobs: Vec<JobResult>,
    qa: QAScorePool,
}

impl TaskResults for ProduceResults {
    fn task_name(&self) -> &str {
        "produce"
    }

    fn qa(&self) -> &QAScorePool {
        &self.qa
    }

    fn qa_mut(&mut self) -> &mut QAScorePool {
        &mut self.qa
    }

    fn merge_with_context(
        &self,
        context: &mut Context,
        storage: &dyn Storage,
    ) -> Result<(), TaskError> {
        context.accept_calapps(self.calapps.accepted(), storage)?;
        Ok(())
    }
}

/// Pretends to solve for a gain table.
struct Produce {
    table: &'static str,
    score: Option<f64>,
}

impl Produce {
    fn new(table: &'static str) -> Produce {
        Produce { table, score: None }
    }
}

impl Task for Produce {
    type Results = ProduceResults;

    fn name(&self) -> &'static str {
        "produce"
    }

    fn prepare(&mut self, executor: &mut Executor) -> Result<ProduceResults, TaskError> {
        let job = JobRequest::new("gaincal")
            .arg("vis", "a.ms")
            .arg("caltable", self.table);
        let mut results = ProduceResults::default();
        results.jobs.push(executor.execute_job(job)?);
        results.calapps.push(CalApplication::single(
            CalTo::new(Some("a.ms")),
            CalFrom::new(self.table, CalType::Gaincal, vec![], "linear", true),
        ));
        if let Some(score) = self.score {
            results.qa.push(QAScore::new(score, "Made up", "Made up"));
        }
        Ok(results)
    }

    fn analyse(
        &mut self,
        mut results: ProduceResults,
        executor: &mut Executor,
    ) -> Result<ProduceResults, TaskError> {
        results.calapps.verify(executor.storage());
        Ok(results)
    }
}

/// Runs [`Produce`] as a sub-task.
struct Wrapper;

impl Task for Wrapper {
    type Results = ResultsList;

    fn name(&self) -> &'static str {
        "wrapper"
    }

    fn prepare(&mut self, executor: &mut Executor) -> Result<ResultsList, TaskError> {
        let mut list = ResultsList::new("wrapper");
        list.push(executor.execute(&mut Produce::new("inner.tbl"), true)?);
        Ok(list)
    }
}

fn num_applicable(executor: &Executor) -> usize {
    executor
        .context()
        .callibrary
        .get_applicable("a.ms", 17, 0, 0, "BANDPASS")
        .len()
}

#[test]
fn test_execute_merges_results() {
    let (mut executor, runner, _) = test_executor();
    let results = executor.execute(&mut Produce::new("g.tbl"), true).unwrap();
    assert_eq!(runner.job_names(), vec!["gaincal"]);
    assert!(results.jobs[0].executed);
    assert_eq!(results.calapps.accepted().len(), 1);
    assert_eq!(num_applicable(&executor), 1);

    let history = executor.context().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].stage, 1);
    assert_eq!(history[0].task, "produce");
    assert_eq!(history[0].outcome, MergeOutcome::Merged);
    // Nothing scored these results.
    assert_eq!(history[0].representative, QAScore::no_qa());
}

#[test]
fn test_execute_without_merge_leaves_context_alone() {
    let (mut executor, _, _) = test_executor();
    executor.execute(&mut Produce::new("g.tbl"), false).unwrap();
    assert_eq!(num_applicable(&executor), 0);
    assert_eq!(
        executor.context().history()[0].outcome,
        MergeOutcome::NotRequested
    );
}

#[test]
fn test_qa_gate() {
    let (executor, _, _) = test_executor();
    let mut executor = executor.with_gate(QaGate::new(Some(0.5)));

    let mut task = Produce::new("bad.tbl");
    task.score = Some(0.3);
    executor.execute(&mut task, true).unwrap();
    assert_eq!(num_applicable(&executor), 0);
    assert_eq!(
        executor.context().history()[0].outcome,
        MergeOutcome::RejectedByQa
    );

    // The threshold itself is acceptable.
    let mut task = Produce::new("ok.tbl");
    task.score = Some(0.5);
    executor.execute(&mut task, true).unwrap();
    assert_eq!(num_applicable(&executor), 1);
    assert_eq!(executor.context().history()[1].stage, 2);
}

#[test]
fn test_missing_outputs_are_not_merged() {
    let storage = InMemoryStorage::default();
    let mut runner = RecordingRunner::new(storage.clone());
    runner.produce_tables = false;
    let mut executor = Executor::new(test_context(), Box::new(runner), Box::new(storage));

    let results = executor.execute(&mut Produce::new("g.tbl"), true).unwrap();
    assert!(results.calapps.accepted().is_empty());
    assert_eq!(results.calapps.errors().len(), 1);
    assert_eq!(num_applicable(&executor), 0);
}

#[test]
fn test_dry_run() {
    let (executor, runner, storage) = test_executor();
    let mut executor = executor.with_dry_run(true);
    let results = executor.execute(&mut Produce::new("g.tbl"), true).unwrap();

    assert!(runner.jobs.borrow().is_empty());
    assert!(!results.jobs[0].executed);
    assert!(!storage.exists(Path::new("g.tbl")));
    // Outputs are assumed to exist.
    assert_eq!(results.calapps.accepted().len(), 1);
    assert_eq!(num_applicable(&executor), 1);
}

#[test]
fn test_job_failure_propagates() {
    let storage = InMemoryStorage::default();
    let mut runner = RecordingRunner::new(storage.clone());
    runner.fail_task = Some("gaincal".to_string());
    let mut executor = Executor::new(test_context(), Box::new(runner), Box::new(storage));

    let result = executor.execute(&mut Produce::new("g.tbl"), true);
    assert!(matches!(result, Err(TaskError::Job(JobError::Failed { .. }))));
    assert!(executor.context().history().is_empty());
    assert_eq!(num_applicable(&executor), 0);
}

#[test]
fn test_sub_tasks_share_the_stage() {
    let (mut executor, _, _) = test_executor();
    let results = executor.execute(&mut Wrapper, false).unwrap();
    assert_eq!(results.len(), 1);

    let history = executor.context().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].task, "produce");
    assert_eq!(history[0].depth, 1);
    assert_eq!(history[0].outcome, MergeOutcome::Merged);
    assert_eq!(history[1].task, "wrapper");
    assert_eq!(history[1].depth, 0);
    assert!(history.iter().all(|h| h.stage == 1));
    assert_eq!(executor.context().stage(), 1);
    // The sub-task asked to be merged, so its table is available.
    assert_eq!(num_applicable(&executor), 1);
}

#[test]
fn test_job_request_display() {
    let job = JobRequest::new("gaincal")
        .arg("vis", "a.ms")
        .arg("minsnr", 3.0)
        .arg("calwt", true)
        .arg("spw", vec!["17".to_string(), "19".to_string()]);
    assert_eq!(
        job.to_string(),
        "gaincal(vis='a.ms', minsnr=3, calwt=True, spw=['17', '19'])"
    );
    assert_eq!(job.get_str("vis"), Some("a.ms"));
    assert_eq!(job.get_str("minsnr"), None);
}

#[test]
fn test_parse_ids() {
    let ids = parse_ids("spw", "17, 19~21").unwrap();
    assert_eq!(ids, BTreeSet::from([17, 19, 20, 21]));
    assert_eq!(format_ids(&ids), "17,19,20,21");
    assert!(parse_ids("spw", "").unwrap().is_empty());
    assert!(matches!(
        parse_ids("spw", "seventeen"),
        Err(InputsError::Invalid { name: "spw", .. })
    ));
    assert!(parse_ids("spw", "5~3").is_err());

    // Huge ranges are refused rather than expanded.
    assert!(matches!(
        parse_ids("spw", "0~4294967295"),
        Err(InputsError::Invalid { name: "spw", .. })
    ));
    let ids = parse_ids("antenna", &format!("1~{MAX_ID_RANGE_LEN}")).unwrap();
    assert_eq!(ids.len() as u32, MAX_ID_RANGE_LEN);
    assert!(parse_ids("antenna", &format!("0~{MAX_ID_RANGE_LEN}")).is_err());
}

#[test]
fn test_split_csv_and_intents() {
    assert_eq!(split_csv(" a, ,b "), vec!["a", "b"]);
    assert_eq!(strip_intent_wildcards("*BANDPASS*"), "BANDPASS");
}
