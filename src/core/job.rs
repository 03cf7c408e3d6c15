//! Job domain model and matrix expansion

use crate::core::{
    config::JobConfig,
    context::render_template,
    state::JobState,
    step::{Step, StepDefaults},
};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};

/// A job: an ordered list of steps run on one or more environments
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Jobs that must complete first
    pub needs: Vec<String>,

    /// Environment label template
    pub runs_on: String,

    /// Matrix dimensions, each with at least one value
    pub matrix: BTreeMap<String, Vec<String>>,

    pub steps: Vec<Step>,

    /// Runtime state (not serialized)
    pub state: JobState,
}

/// One concrete run of a job: a single matrix combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInstance {
    pub job_id: String,
    pub environment: String,
    pub matrix: BTreeMap<String, String>,
}

impl Job {
    pub fn from_config(id: &str, config: &JobConfig, defaults: &StepDefaults) -> Result<Self> {
        let defaults = StepDefaults {
            timeout_secs: config
                .timeout_minutes
                .map(|m| m.saturating_mul(60))
                .unwrap_or(defaults.timeout_secs),
        };

        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                Step::from_config(step, &defaults)
                    .with_context(|| format!("Job '{}' step #{}", id, index + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Job {
            id: id.to_string(),
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            needs: config.needs.clone(),
            runs_on: config.runs_on.clone(),
            matrix: config.matrix(),
            steps,
            state: JobState::Pending,
        })
    }

    /// Check if every need is in `completed`
    pub fn dependencies_met(&self, completed: &HashSet<String>) -> bool {
        self.needs.iter().all(|need| completed.contains(need))
    }

    /// Expand the matrix into instances (cartesian product, keys in sorted order)
    pub fn instances(&self) -> Vec<JobInstance> {
        let mut combinations: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];

        for (key, values) in &self.matrix {
            combinations = combinations
                .into_iter()
                .flat_map(|combination| {
                    values.iter().map(move |value| {
                        let mut next = combination.clone();
                        next.insert(key.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }

        combinations
            .into_iter()
            .map(|matrix| {
                let environment = render_template(&self.runs_on, |expr| {
                    expr.strip_prefix("matrix.")
                        .and_then(|k| matrix.get(k).cloned())
                });
                JobInstance {
                    job_id: self.id.clone(),
                    environment,
                    matrix,
                }
            })
            .collect()
    }
}
