//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every job completed
    Completed,
    /// At least one job failed
    Failed,
    /// The event did not match the workflow trigger
    NotTriggered,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::NotTriggered => "NotTriggered",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "Failed" => ExecutionStatus::Failed,
            "NotTriggered" => ExecutionStatus::NotTriggered,
            _ => ExecutionStatus::Pending,
        }
    }
}

/// Outcome of a single step in one job instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Succeeded { output: String },
    Failed { error: String },
    Skipped { reason: String },
}

/// Record of a step run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Record of one job instance (one matrix combination)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceReport {
    /// Environment label the instance ran on
    pub environment: String,

    /// Matrix values of the instance
    pub matrix: BTreeMap<String, String>,

    /// Step records, in declaration order
    pub steps: Vec<StepReport>,
}

impl InstanceReport {
    pub fn new(environment: String, matrix: BTreeMap<String, String>) -> Self {
        Self {
            environment,
            matrix,
            steps: Vec::new(),
        }
    }

    /// True when no step failed
    pub fn succeeded(&self) -> bool {
        self.failure().is_none()
    }

    /// The failing step and its error
    pub fn failure(&self) -> Option<(&str, &str)> {
        self.steps.iter().find_map(|s| match &s.outcome {
            StepOutcome::Failed { error } => Some((s.name.as_str(), error.as_str())),
            _ => None,
        })
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// State of a job (all of its instances)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for its needs
    Pending,
    /// Instances are running
    Running { started_at: DateTime<Utc> },
    /// Every instance succeeded
    Completed {
        instances: Vec<InstanceReport>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// At least one instance failed
    Failed {
        error: String,
        instances: Vec<InstanceReport>,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Never started because a need did not complete
    Skipped { reason: String },
}

impl JobState {
    /// Check if job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::Failed { .. } | JobState::Skipped { .. }
        )
    }

    /// Instance records, if the job ran
    pub fn instances(&self) -> &[InstanceReport] {
        match self {
            JobState::Completed { instances, .. } | JobState::Failed { instances, .. } => {
                instances.as_slice()
            }
            _ => &[],
        }
    }
}

/// Overall run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// Triggering ref
    pub git_ref: Option<String>,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub skipped_jobs: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            git_ref: None,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
        }
    }

    /// Mark run as started
    pub fn start(&mut self, total_jobs: usize, git_ref: String) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.git_ref = Some(git_ref);
        self.total_jobs = total_jobs;
    }

    /// Mark run as not triggered by its event
    pub fn not_triggered(&mut self, git_ref: String) {
        let now = Utc::now();
        self.status = ExecutionStatus::NotTriggered;
        self.git_ref = Some(git_ref);
        self.started_at = Some(now);
        self.completed_at = Some(now);
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn update_counts(&mut self, completed: usize, failed: usize, skipped: usize) {
        self.completed_jobs = completed;
        self.failed_jobs = failed;
        self.skipped_jobs = skipped;
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.completed_jobs + self.failed_jobs + self.skipped_jobs) as f64
            / self.total_jobs as f64
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
