//! Test: artifacts are uploaded only for tag refs

use crate::helpers::*;
use solr_subquery::core::{Event, ExecutionStatus, GitRef, StepOutcome};

#[tokio::test]
async fn test_manual_branch_run_builds_without_uploading() {
    let harness = Harness::new(ScriptedRunner::new()).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = dispatchable_release_workflow();

    harness
        .run(&mut workflow, Event::Manual(GitRef::branch("main")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert_eq!(
        harness
            .runner
            .commands()
            .iter()
            .filter(|c| c.command.contains("maturin build"))
            .count(),
        2
    );

    for instance in instances(&workflow, "release") {
        assert!(matches!(
            step_outcome(instance, "Build wheels"),
            StepOutcome::Succeeded { .. }
        ));
        match step_outcome(instance, "Upload wheels") {
            StepOutcome::Skipped { reason } => assert!(reason.contains("refs/tags/"), "{}", reason),
            other => panic!("expected upload to be skipped, got {:?}", other),
        }
    }

    assert!(harness.publisher.uploads().is_empty());
}

#[tokio::test]
async fn test_manual_tag_run_uploads() {
    let harness = Harness::new(ScriptedRunner::new()).with_wheels(&["pkg-2.0.0.whl"]);
    let mut workflow = dispatchable_release_workflow();

    harness
        .run(&mut workflow, Event::Manual(GitRef::tag("v2.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert_eq!(harness.publisher.uploads().len(), 2);
}
