//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    job::Job,
    state::{ExecutionStatus, JobState, RunState},
    step::StepDefaults,
    trigger::Trigger,
};
use anyhow::Result;
use std::collections::{HashMap, HashSet};

/// A workflow definition plus the state of its current run
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Activation gate
    pub trigger: Trigger,

    /// Jobs keyed by id
    pub jobs: HashMap<String, Job>,

    /// Execution state
    pub state: RunState,

    /// Job order (topological sort, not serialized)
    execution_order: Vec<String>,
}

impl Workflow {
    /// Create a workflow from configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let defaults = StepDefaults::default();

        let jobs = config
            .jobs
            .iter()
            .map(|(id, job_config)| Ok((id.clone(), Job::from_config(id, job_config, &defaults)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        let execution_order = Self::topological_sort(&jobs);

        Ok(Workflow {
            name: config.name.clone(),
            trigger: Trigger::from_config(&config.trigger),
            jobs,
            state: RunState::new(),
            execution_order,
        })
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    fn ids_where<F>(&self, predicate: F) -> HashSet<String>
    where
        F: Fn(&JobState) -> bool,
    {
        self.jobs
            .values()
            .filter(|j| predicate(&j.state))
            .map(|j| j.id.clone())
            .collect()
    }

    /// Pending jobs whose needs have all completed, in execution order
    pub fn ready_jobs(&self) -> Vec<String> {
        let completed = self.ids_where(|s| matches!(s, JobState::Completed { .. }));

        self.execution_order
            .iter()
            .filter(|id| {
                self.jobs.get(*id).is_some_and(|job| {
                    matches!(job.state, JobState::Pending) && job.dependencies_met(&completed)
                })
            })
            .cloned()
            .collect()
    }

    /// Pending jobs that can never run, with the need that blocks each
    pub fn blocked_jobs(&self) -> Vec<(String, String)> {
        let dead = self.ids_where(|s| matches!(s, JobState::Failed { .. } | JobState::Skipped { .. }));

        self.execution_order
            .iter()
            .filter_map(|id| {
                let job = self.jobs.get(id)?;
                if !matches!(job.state, JobState::Pending) {
                    return None;
                }
                job.needs
                    .iter()
                    .find(|need| dead.contains(*need))
                    .map(|need| (id.clone(), need.clone()))
            })
            .collect()
    }

    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.values().all(|j| j.state.is_terminal())
    }

    /// Check if any job failed
    pub fn has_failures(&self) -> bool {
        self.jobs
            .values()
            .any(|j| matches!(j.state, JobState::Failed { .. }))
    }

    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failed
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Jobs grouped into stages: every job sits one stage after its latest need
    pub fn stages(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut stages: Vec<Vec<String>> = Vec::new();

        for id in &self.execution_order {
            let Some(job) = self.jobs.get(id) else {
                continue;
            };
            let level = job
                .needs
                .iter()
                .filter_map(|need| depth.get(need.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id.as_str(), level);

            if stages.len() <= level {
                stages.resize_with(level + 1, Vec::new);
            }
            stages[level].push(id.clone());
        }

        stages
    }

    /// Recount job states into the run state
    pub fn update_counts(&mut self) {
        let mut completed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for job in self.jobs.values() {
            match &job.state {
                JobState::Completed { .. } => completed += 1,
                JobState::Failed { .. } => failed += 1,
                JobState::Skipped { .. } => skipped += 1,
                _ => {}
            }
        }

        self.state.update_counts(completed, failed, skipped);
    }

    /// Calculate topological sort of jobs based on needs
    fn topological_sort(jobs: &HashMap<String, Job>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        // Sort for deterministic order
        let mut job_ids: Vec<_> = jobs.keys().cloned().collect();
        job_ids.sort();

        for job_id in job_ids {
            Self::visit(&job_id, jobs, &mut visited, &mut result);
        }

        result
    }

    fn visit(
        job_id: &str,
        jobs: &HashMap<String, Job>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(job_id.to_string()) {
            return;
        }

        if let Some(job) = jobs.get(job_id) {
            for need in &job.needs {
                Self::visit(need, jobs, visited, result);
            }
        }

        result.push(job_id.to_string());
    }
}
