//! Test: the release stage waits for, and depends on, the test stage

use crate::helpers::*;
use solr_subquery::core::{Event, ExecutionStatus, GitRef, JobState};
use solr_subquery::execution::ExecutionEvent;

#[tokio::test]
async fn test_release_starts_after_test_completes() {
    let harness = Harness::new(ScriptedRunner::new()).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);

    let commands = harness.runner.commands();
    let last_test = commands
        .iter()
        .filter(|c| c.command.contains("cargo test"))
        .map(|c| c.seq)
        .max()
        .unwrap();
    let first_release = commands
        .iter()
        .filter(|c| c.command.contains("python3") || c.command.contains("maturin"))
        .map(|c| c.seq)
        .min()
        .unwrap();
    assert!(last_test < first_release);

    // Every JobStarted for release comes after test's JobCompleted
    let events = harness.events();
    let test_done = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::JobCompleted { job_id } if job_id == "test"))
        .unwrap();
    assert!(events.iter().enumerate().all(|(i, e)| match e {
        ExecutionEvent::JobStarted { job_id, .. } if job_id == "release" => i > test_done,
        _ => true,
    }));
}

#[tokio::test]
async fn test_failing_tests_block_release() {
    let harness =
        Harness::new(ScriptedRunner::new().failing("cargo test")).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    assert_eq!(workflow.state.failed_jobs, 1);
    assert_eq!(workflow.state.skipped_jobs, 1);

    match &workflow.job("test").unwrap().state {
        JobState::Failed { error, .. } => {
            assert!(error.contains("exited with status 101"), "{}", error)
        }
        other => panic!("expected test to fail, got {:?}", other),
    }

    assert_skipped(&workflow, "release");
    match &workflow.job("release").unwrap().state {
        JobState::Skipped { reason } => assert_eq!(reason, "dependency 'test' did not complete"),
        _ => unreachable!(),
    }

    assert!(harness.runner.commands_on("macos-latest").is_empty());
    assert!(!harness.runner.ran("maturin"));
    assert!(harness.publisher.uploads().is_empty());
}

#[tokio::test]
async fn test_toolchain_failure_fails_test_stage() {
    let harness = Harness::new(ScriptedRunner::new().failing("rustup toolchain install"));
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    let test = &instances(&workflow, "test")[0];
    assert!(matches!(
        step_outcome(test, "Run tests"),
        solr_subquery::core::StepOutcome::Skipped { .. }
    ));
    assert!(!harness.runner.ran("cargo test"));
    assert_skipped(&workflow, "release");
}
