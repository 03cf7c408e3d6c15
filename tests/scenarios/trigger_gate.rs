//! Test: only version tags start the workflow

use crate::helpers::*;
use solr_subquery::core::{Event, ExecutionStatus, GitRef, JobState};
use solr_subquery::execution::ExecutionEvent;

#[tokio::test]
async fn test_branch_push_does_not_trigger() {
    let harness = Harness::new(ScriptedRunner::new());
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::branch("main")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::NotTriggered);
    assert!(harness.runner.commands().is_empty());
    assert!(harness.publisher.uploads().is_empty());
    assert!(workflow
        .jobs
        .values()
        .all(|job| matches!(job.state, JobState::Pending)));
}

#[tokio::test]
async fn test_non_version_tag_does_not_trigger() {
    let harness = Harness::new(ScriptedRunner::new());
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("nightly-2024")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::NotTriggered);
    assert!(harness.runner.commands().is_empty());

    let events = harness.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ExecutionEvent::RunNotTriggered { .. }));
}

#[tokio::test]
async fn test_manual_run_needs_dispatch() {
    let harness = Harness::new(ScriptedRunner::new());
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Manual(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::NotTriggered);
    assert!(harness.runner.commands().is_empty());
}
