//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

pub use crate::core::ExecutionStatus;
use crate::core::Workflow;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow_name: String,

    /// Triggering ref (e.g. `refs/tags/v1.2.3`)
    pub git_ref: String,

    pub status: ExecutionStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if it did)
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub total_jobs: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or replace) a run
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>>;

    /// All runs of a workflow, newest first
    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>>;

    /// Names of every workflow with recorded runs
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.execution_id, run.clone());
        Ok(())
    }

    async fn load_run(&self, execution_id: Uuid) -> Result<Option<RunSummary>> {
        Ok(self.runs.read().await.get(&execution_id).cloned())
    }

    async fn list_runs(&self, workflow_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| r.workflow_name == workflow_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.workflow_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a workflow's run state
pub fn create_summary(workflow: &Workflow) -> RunSummary {
    let state = &workflow.state;
    RunSummary {
        execution_id: state.execution_id,
        workflow_name: workflow.name.clone(),
        git_ref: state.git_ref.clone().unwrap_or_default(),
        status: state.status,
        started_at: state.started_at.unwrap_or_else(Utc::now),
        completed_at: state.completed_at,
        progress: state.progress(),
        completed_jobs: state.completed_jobs,
        failed_jobs: state.failed_jobs,
        total_jobs: state.total_jobs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::WorkflowConfig;
    use chrono::Duration;

    fn summary(workflow: &str, minutes_ago: i64) -> RunSummary {
        RunSummary {
            execution_id: Uuid::new_v4(),
            workflow_name: workflow.to_string(),
            git_ref: "refs/tags/v1.0.0".to_string(),
            status: ExecutionStatus::Completed,
            started_at: Utc::now() - Duration::minutes(minutes_ago),
            completed_at: Some(Utc::now()),
            progress: 1.0,
            completed_jobs: 2,
            failed_jobs: 0,
            total_jobs: 2,
        }
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryPersistence::new();
        let older = summary("Release", 10);
        let newer = summary("Release", 1);
        store.save_run(&older).await.unwrap();
        store.save_run(&newer).await.unwrap();
        store.save_run(&summary("Nightly", 5)).await.unwrap();

        let loaded = store.load_run(older.execution_id).await.unwrap().unwrap();
        assert_eq!(loaded.git_ref, "refs/tags/v1.0.0");

        let runs = store.list_runs("Release").await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].execution_id, newer.execution_id);

        assert_eq!(
            store.list_workflows().await.unwrap(),
            vec!["Nightly".to_string(), "Release".to_string()]
        );
    }

    #[test]
    fn test_summary_of_fresh_workflow() {
        let workflow = WorkflowConfig::default_release().unwrap().to_workflow().unwrap();
        let summary = create_summary(&workflow);

        assert_eq!(summary.workflow_name, workflow.name);
        assert_eq!(summary.status, ExecutionStatus::Pending);
        assert!(summary.git_ref.is_empty());
        assert_eq!(summary.progress, 0.0);
    }
}
