//! Test: the release stage fans out once per operating system

use crate::helpers::*;
use solr_subquery::core::{Event, ExecutionStatus, GitRef, JobState, StepOutcome};
use solr_subquery::execution::{ExecutionEvent, SchedulingStrategy};
use std::time::Duration;

#[tokio::test]
async fn test_exactly_one_instance_per_os() {
    let harness = Harness::new(ScriptedRunner::new()).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    let environments: Vec<&str> = instances(&workflow, "release")
        .iter()
        .map(|i| i.environment.as_str())
        .collect();
    assert_eq!(environments, vec!["ubuntu-latest", "macos-latest"]);

    let started: Vec<String> = harness
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::JobStarted { job_id, environment } if job_id == "release" => {
                Some(environment)
            }
            _ => None,
        })
        .collect();
    assert_eq!(started.len(), 2);

    assert_eq!(
        harness
            .runner
            .commands_on("macos-latest")
            .iter()
            .filter(|c| c.contains("maturin build"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_instances_receive_their_own_matrix_values() {
    let harness = Harness::new(ScriptedRunner::new()).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    for instance in instances(&workflow, "release") {
        assert_eq!(instance.matrix["os"], instance.environment);
    }
    assert!(harness
        .runner
        .commands_on("macos-latest")
        .contains(&"python3 -m pip install maturin".to_string()));
}

#[tokio::test]
async fn test_one_instance_failing_leaves_the_other_to_finish() {
    let runner = ScriptedRunner::new()
        .failing_on("macos-latest", "maturin build")
        .with_delay(Duration::from_millis(5));
    let harness = Harness::new(runner).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);

    let release = instances(&workflow, "release");
    let ubuntu = release.iter().find(|i| i.environment == "ubuntu-latest").unwrap();
    let macos = release.iter().find(|i| i.environment == "macos-latest").unwrap();

    assert!(ubuntu.succeeded());
    assert!(matches!(
        step_outcome(ubuntu, "Upload wheels"),
        StepOutcome::Succeeded { .. }
    ));

    assert!(matches!(
        step_outcome(macos, "Build wheels"),
        StepOutcome::Failed { .. }
    ));
    assert_eq!(
        step_outcome(macos, "Upload wheels"),
        &StepOutcome::Skipped {
            reason: "previous step 'Build wheels' failed".to_string()
        }
    );

    let uploads = harness.publisher.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "ubuntu-latest");

    match &workflow.job("release").unwrap().state {
        JobState::Failed { error, .. } => {
            assert!(error.starts_with("macos-latest: Build wheels:"), "{}", error)
        }
        other => panic!("expected release to fail, got {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_python_fails_provisioning() {
    let runner = ScriptedRunner::new().with_version_report("Python 2.7.18");
    let harness = Harness::new(runner).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Failed);
    for instance in instances(&workflow, "release") {
        match step_outcome(instance, "Set up Python") {
            StepOutcome::Failed { error } => assert!(error.contains("2.7.18"), "{}", error),
            other => panic!("expected provisioning failure, got {:?}", other),
        }
    }
    assert!(!harness.runner.ran("maturin"));
    assert!(harness.publisher.uploads().is_empty());
}

#[tokio::test]
async fn test_release_instances_run_concurrently() {
    let runner = ScriptedRunner::new().with_delay(Duration::from_millis(50));
    let harness = Harness::new(runner).with_wheels(&["pkg-1.0.0.whl"]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    let ubuntu = harness.runner.span("ubuntu-latest", &["maturin build"]);
    let macos = harness.runner.span("macos-latest", &["maturin build"]);
    assert!(overlaps(ubuntu, macos));
}

#[tokio::test]
async fn test_sequential_strategy_runs_instances_in_matrix_order() {
    let runner = ScriptedRunner::new().with_delay(Duration::from_millis(20));
    let harness = Harness::new(runner)
        .with_wheels(&["pkg-1.0.0.whl"])
        .with_strategy(SchedulingStrategy::Sequential);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.0.0")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    let release_commands = ["python3", "maturin"];
    let ubuntu = harness.runner.span("ubuntu-latest", &release_commands);
    let macos = harness.runner.span("macos-latest", &release_commands);
    assert!(!overlaps(ubuntu, macos));
    assert!(ubuntu.1 <= macos.0);
}
