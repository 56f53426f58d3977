// tests/pipeline_execution.rs

mod common;
use crate::common::init_tracing;

use std::sync::{Arc, Mutex};

use ngspipe::driver::{DirectShell, SharedDriver};
use ngspipe::pipeline::{Phase, PhaseStatus, Pipeline, PipelineError, StepFailure, StepState};
use ngspipe_test_utils::{ScriptedStepBuilder, with_timeout};

fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[tokio::test]
async fn hard_failure_stops_the_pipeline() {
    init_tracing();
    let log = journal();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_work(ScriptedStepBuilder::new("A").journal(log.clone()).build())
        .add_work(
            ScriptedStepBuilder::new("B")
                .journal(log.clone())
                .fail_at(Phase::Prepare, "missing input")
                .build(),
        )
        .add_work(ScriptedStepBuilder::new("C").journal(log.clone()).build());

    let err = pipeline.execute().await.unwrap_err();
    match err {
        PipelineError::StepFailed { step, failure, .. } => {
            assert_eq!(step, "B");
            assert!(matches!(failure, StepFailure::Precondition(ref m) if m == "missing input"));
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }

    assert!(pipeline.finished());
    assert_eq!(pipeline.return_code(), Some(-1));
    let seen = entries(&log);
    assert!(seen.iter().all(|e| !e.starts_with("C:")), "C must never run: {seen:?}");
    assert!(!seen.contains(&"B:run".to_string()));
}

#[tokio::test]
async fn soft_skip_continues_with_next_step() {
    init_tracing();
    let log = journal();

    let mut pipeline = Pipeline::new();
    pipeline
        .add_work(
            ScriptedStepBuilder::new("A")
                .journal(log.clone())
                .skip_at(Phase::Precheck, "nothing to do")
                .build(),
        )
        .add_work(ScriptedStepBuilder::new("B").journal(log.clone()).build());

    let summary = pipeline.execute().await.unwrap();

    assert_eq!(summary.reports.len(), 2);
    let a = &summary.reports[0];
    assert_eq!(a.state, StepState::SkippedSoft);
    assert_eq!(a.return_code, 0);
    assert_eq!(*a.phases.get(Phase::Precheck), PhaseStatus::Skipped("nothing to do".to_string()));
    assert_eq!(*a.phases.get(Phase::Run), PhaseStatus::NotRun);
    assert_eq!(summary.reports[1].state, StepState::Done);
    assert_eq!(
        entries(&log),
        vec!["A:precheck", "B:precheck", "B:prepare", "B:run", "B:postcheck"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn exit_code_of_a_command_becomes_the_return_code() {
    init_tracing();
    let driver: SharedDriver = Arc::new(DirectShell::new());

    let mut pipeline = Pipeline::new();
    pipeline.add_work(
        ScriptedStepBuilder::new("exit")
            .driver(driver.clone())
            .run_command("echo about to fail; exit 123")
            .build(),
    );

    let err = pipeline.execute().await.unwrap_err();
    match err {
        PipelineError::StepFailed { failure, output, .. } => {
            assert!(matches!(
                failure,
                StepFailure::CommandFailed { exit_code: Some(123), .. }
            ));
            let output = output.expect("driver output is attached");
            assert_eq!(output.contents(), vec!["about to fail\n"]);
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(pipeline.return_code(), Some(123));
    assert!(!driver.success());
}

#[cfg(unix)]
#[tokio::test]
async fn failed_postcheck_after_clean_exit_is_not_reported_as_success() {
    init_tracing();
    let driver: SharedDriver = Arc::new(DirectShell::new());

    let mut pipeline = Pipeline::new();
    pipeline.add_work(
        ScriptedStepBuilder::new("verify")
            .driver(driver.clone())
            .run_command("exit 0")
            .fail_at(Phase::Postcheck, "expected output missing")
            .build(),
    );

    let mut run = pipeline.spawn();
    let report = with_timeout(run.next_report()).await.expect("one report");
    assert_eq!(report.state, StepState::FailedHard);
    assert_eq!(report.return_code, -1);

    assert!(matches!(run.finish().await, Err(PipelineError::StepFailed { .. })));
    assert!(driver.success());
}

#[cfg(unix)]
#[tokio::test]
async fn failed_pipeline_return_code_is_never_zero() {
    let driver: SharedDriver = Arc::new(DirectShell::new());
    let mut pipeline = Pipeline::new();
    pipeline
        .add_work(ScriptedStepBuilder::new("A").build())
        .add_work(
            ScriptedStepBuilder::new("B")
                .driver(driver)
                .run_command("exit 0")
                .fail_at(Phase::Postcheck, "bad")
                .build(),
        );

    pipeline.execute().await.unwrap_err();
    assert!(pipeline.finished());
    assert_ne!(pipeline.return_code(), Some(0));
}

#[tokio::test]
async fn a_pipeline_runs_only_once() {
    let mut pipeline = Pipeline::new();
    pipeline.add_work(ScriptedStepBuilder::new("A").build());
    pipeline.execute().await.unwrap();
    assert!(matches!(pipeline.execute().await, Err(PipelineError::AlreadyExecuted)));
}

#[tokio::test]
async fn empty_pipeline_finishes_without_return_code() {
    let mut pipeline = Pipeline::new();
    let summary = pipeline.execute().await.unwrap();
    assert!(summary.reports.is_empty());
    assert_eq!(summary.return_code, None);
    assert!(pipeline.finished());
}

#[cfg(unix)]
#[tokio::test]
async fn spawned_pipeline_reports_steps_in_order() {
    init_tracing();
    let driver: SharedDriver = Arc::new(DirectShell::new());

    let mut pipeline = Pipeline::new();
    pipeline
        .add_work(ScriptedStepBuilder::new("first").driver(driver.clone()).run_command("exit 0").build())
        .add_work(ScriptedStepBuilder::new("second").skip_at(Phase::Prepare, "done before").build())
        .add_work(ScriptedStepBuilder::new("third").driver(driver).run_command("exit 0").build());

    let mut run = pipeline.spawn();
    let mut names = Vec::new();
    with_timeout(async {
        while let Some(report) = run.next_report().await {
            names.push((report.index, report.step));
        }
    })
    .await;

    let summary = run.finish().await.unwrap();
    assert_eq!(
        names,
        vec![(0, "first".to_string()), (1, "second".to_string()), (2, "third".to_string())]
    );
    assert_eq!(summary.return_code, Some(0));
}
