//! Test: a dry run of a tag push needs neither wheels nor a token

use crate::helpers::*;
use solr_subquery::core::{Event, ExecutionStatus, GitRef, StepOutcome};
use solr_subquery::execution::{DryRunPublisher, DryRunRunner, ExecutionEngine};
use std::sync::Arc;

#[tokio::test]
async fn test_dry_run_without_token_completes() {
    let runner = Arc::new(DryRunRunner::new());
    let publisher = Arc::new(DryRunPublisher::new());
    let workdir = tempfile::TempDir::new().unwrap();
    let engine =
        ExecutionEngine::new(runner.clone(), publisher.clone()).with_working_dir(workdir.path());
    let mut workflow = release_workflow();

    engine
        .execute(&mut workflow, &Event::Push(GitRef::tag("v1.2.3")))
        .await
        .unwrap();

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    for instance in instances(&workflow, "release") {
        assert!(matches!(
            step_outcome(instance, "Upload wheels"),
            StepOutcome::Succeeded { .. }
        ));
    }

    let uploads = publisher.uploads();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().all(|(_, tag, _)| tag == "v1.2.3"));
    assert!(runner
        .commands()
        .iter()
        .any(|(env, command)| env == "macos-latest" && command == "sh -c 'maturin build'"));
}
