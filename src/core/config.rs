//! Workflow configuration from YAML

use crate::core::{condition::Condition, context::template_keys, Workflow};
use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// The release workflow shipped with the crate
pub const DEFAULT_WORKFLOW: &str = include_str!("../../release.yml");

/// Default file name looked up by the CLI
pub const DEFAULT_WORKFLOW_FILE: &str = "release.yml";

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    pub name: String,

    /// Events that activate the workflow
    #[serde(rename = "on", default)]
    pub trigger: TriggerConfig,

    /// Jobs keyed by id
    pub jobs: BTreeMap<String, JobConfig>,
}

/// Activation rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Ref-push rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushTrigger>,

    /// Whether the workflow may be started by hand
    #[serde(default)]
    pub workflow_dispatch: bool,
}

/// Globs matched against pushed tag and branch names
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushTrigger {
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub branches: Vec<String>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Human-readable job name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Jobs that must complete before this one starts
    #[serde(default, deserialize_with = "one_or_many")]
    pub needs: Vec<String>,

    /// Execution environment label, may reference `${{ matrix.<key> }}`
    pub runs_on: String,

    /// Fan-out strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyConfig>,

    /// Default step timeout for this job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,

    pub steps: Vec<StepConfig>,
}

/// Matrix fan-out
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub matrix: BTreeMap<String, Vec<Value>>,
}

/// Step configuration as defined in YAML
///
/// Exactly one of `toolchain`, `runtime`, `install`, `run` and `publish` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Step condition, e.g. `startsWith(github.ref, 'refs/tags/')`
    #[serde(rename = "if", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,

    /// Toolchain release channel to install and select
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<InstallConfig>,

    /// Shell command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishConfig>,
}

/// Scripting runtime provisioning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Executable name, e.g. `python3`
    pub name: String,

    /// Version pin: `3.x`, `3.11`, or `*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Tool installed through a runtime's package installer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    pub tool: String,

    /// Runtime to install with (defaults to the last provisioned one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

/// Release upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PublishConfig {
    /// Glob of files to upload, relative to the working directory
    pub files: String,

    /// Environment variable holding the release-host token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

impl StepConfig {
    /// Names of the action keys that are set
    pub fn action_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.toolchain.is_some() {
            keys.push("toolchain");
        }
        if self.runtime.is_some() {
            keys.push("runtime");
        }
        if self.install.is_some() {
            keys.push("install");
        }
        if self.run.is_some() {
            keys.push("run");
        }
        if self.publish.is_some() {
            keys.push("publish");
        }
        keys
    }
}

impl JobConfig {
    /// Matrix values rendered as strings
    pub fn matrix(&self) -> BTreeMap<String, Vec<String>> {
        let Some(strategy) = &self.strategy else {
            return BTreeMap::new();
        };

        strategy
            .matrix
            .iter()
            .map(|(key, values)| {
                let values = values
                    .iter()
                    .map(|value| match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        // Fallback: serialize non-scalars
                        other => serde_yaml::to_string(other)
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                    })
                    .collect();
                (key.clone(), values)
            })
            .collect()
    }
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded release workflow
    pub fn default_release() -> Result<Self> {
        Self::from_yaml(DEFAULT_WORKFLOW)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        let has_push = match &self.trigger.push {
            Some(push) => {
                if push.tags.is_empty() && push.branches.is_empty() {
                    anyhow::bail!("Push trigger must list at least one tag or branch pattern");
                }
                if push.tags.iter().chain(&push.branches).any(|p| p.trim().is_empty()) {
                    anyhow::bail!("Push trigger contains an empty pattern");
                }
                true
            }
            None => false,
        };
        if !has_push && !self.trigger.workflow_dispatch {
            anyhow::bail!("Workflow '{}' has no trigger", self.name);
        }

        if self.jobs.is_empty() {
            anyhow::bail!("Workflow '{}' defines no jobs", self.name);
        }

        for (job_id, job) in &self.jobs {
            for need in &job.needs {
                if need == job_id {
                    anyhow::bail!("Job '{}' needs itself", job_id);
                }
                if !self.jobs.contains_key(need) {
                    anyhow::bail!("Job '{}' needs non-existent job '{}'", job_id, need);
                }
            }

            let matrix = job.matrix();
            if let Some((key, _)) = matrix.iter().find(|(_, values)| values.is_empty()) {
                anyhow::bail!("Job '{}' matrix key '{}' has no values", job_id, key);
            }

            for key in template_keys(&job.runs_on) {
                match key.strip_prefix("matrix.") {
                    Some(matrix_key) if matrix.contains_key(matrix_key) => {}
                    _ => anyhow::bail!(
                        "Job '{}' runs-on references unknown expression '{}'",
                        job_id,
                        key
                    ),
                }
            }

            if job.steps.is_empty() {
                anyhow::bail!("Job '{}' has no steps", job_id);
            }

            for (index, step) in job.steps.iter().enumerate() {
                let label = step
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("#{}", index + 1));

                match step.action_keys().as_slice() {
                    [_] => {}
                    [] => anyhow::bail!("Job '{}' step {} has no action", job_id, label),
                    keys => anyhow::bail!(
                        "Job '{}' step {} has multiple actions: {}",
                        job_id,
                        label,
                        keys.join(", ")
                    ),
                }

                if let Some(condition) = &step.condition {
                    Condition::parse(condition).map_err(|e| {
                        anyhow::anyhow!("Job '{}' step {}: {}", job_id, label, e)
                    })?;
                }

                if let Some(publish) = &step.publish {
                    if publish.files.trim().is_empty() {
                        anyhow::bail!("Job '{}' step {} publishes no files", job_id, label);
                    }
                    if publish.token_env.trim().is_empty() {
                        anyhow::bail!("Job '{}' step {} has an empty token-env", job_id, label);
                    }
                }
            }
        }

        self.check_cycles()?;

        Ok(())
    }

    /// Check for cycles in the `needs` graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for job_id in self.jobs.keys() {
            if !visited.contains(job_id) {
                self.dfs_check(job_id, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        job_id: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(job_id.to_string());
        recursion_stack.insert(job_id.to_string());

        if let Some(job) = self.jobs.get(job_id) {
            for need in &job.needs {
                if recursion_stack.contains(need) {
                    anyhow::bail!("Cycle detected in job dependencies involving '{}'", need);
                }
                if !visited.contains(need) {
                    self.dfs_check(need, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(job_id);
        Ok(())
    }

    /// Token environment variables referenced by publish steps
    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .jobs
            .values()
            .flat_map(|job| job.steps.iter())
            .filter_map(|step| step.publish.as_ref().map(|p| p.token_env.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}
