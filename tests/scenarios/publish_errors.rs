//! Test: publish failures fail the instance that hit them

use crate::helpers::*;
use solr_subquery::core::{Event, ExecutionStatus, GitRef, StepOutcome};

#[tokio::test]
async fn test_missing_token_fails_publish() {
    let harness = Harness::new(ScriptedRunner::new())
        .with_wheels(&["pkg-1.0.0.whl"])
        .without_token();
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    for instance in instances(&workflow, "release") {
        assert!(matches!(
            step_outcome(instance, "Build wheels"),
            StepOutcome::Succeeded { .. }
        ));
        assert_eq!(
            step_outcome(instance, "Upload wheels"),
            &StepOutcome::Failed {
                error: "credential variable GITHUB_TOKEN is not set".to_string()
            }
        );
    }
    assert!(harness.publisher.uploads().is_empty());
}

#[tokio::test]
async fn test_no_wheels_fails_publish() {
    let harness = Harness::new(ScriptedRunner::new());
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    assert_eq!(workflow.state.completed_jobs, 1);
    for instance in instances(&workflow, "release") {
        assert_eq!(
            step_outcome(instance, "Upload wheels"),
            &StepOutcome::Failed {
                error: "no artifacts match target/wheels/*.whl".to_string()
            }
        );
    }
}
