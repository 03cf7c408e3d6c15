//! Test: pushing v1.2.3 tests, builds on both systems, and publishes to v1.2.3

use crate::helpers::*;
use solr_subquery::core::{Event, ExecutionStatus, GitRef};
use solr_subquery::execution::ExecutionEvent;

#[tokio::test]
async fn test_push_v1_2_3() {
    let harness = Harness::new(ScriptedRunner::new()).with_wheels(&[
        "solr_subquery-1.2.3-cp312-cp312-manylinux_2_34_x86_64.whl",
        "solr_subquery-1.2.3-cp312-cp312-macosx_11_0_arm64.whl",
    ]);
    let mut workflow = release_workflow();

    harness
        .run(&mut workflow, Event::Push(GitRef::tag("v1.2.3")))
        .await;

    assert_eq!(workflow.state.status, ExecutionStatus::Completed);
    assert_eq!(workflow.state.completed_jobs, 2);
    assert_eq!(workflow.state.git_ref.as_deref(), Some("refs/tags/v1.2.3"));

    assert_eq!(
        harness.runner.commands_on("ubuntu-latest")[..3],
        [
            "rustup toolchain install nightly --profile minimal".to_string(),
            "rustup override set nightly".to_string(),
            "sh -c 'cargo test --verbose'".to_string(),
        ]
    );

    let mut uploads = harness.publisher.uploads();
    uploads.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].0, "macos-latest");
    assert_eq!(uploads[1].0, "ubuntu-latest");
    for (_, tag, files) in &uploads {
        assert_eq!(tag, "v1.2.3");
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "whl")));
    }

    let published = harness
        .events()
        .into_iter()
        .filter(|e| matches!(e, ExecutionEvent::ArtifactsPublished { tag, .. } if tag == "v1.2.3"))
        .count();
    assert_eq!(published, 2);

    assert!(matches!(
        harness.events().last(),
        Some(ExecutionEvent::RunCompleted {
            status: ExecutionStatus::Completed,
            ..
        })
    ));
}
