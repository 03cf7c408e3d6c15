//! Job executor - runs the steps of one job instance

use crate::{
    core::{
        state::{InstanceReport, StepOutcome, StepReport},
        step::{Step, StepAction, VersionPin},
        JobInstance, RunContext,
    },
    execution::{
        engine::{EventBus, ExecutionEvent},
        publisher::{resolve_artifacts, PublishError, Publisher, ReleaseUpload},
        runner::{CommandOutput, JobEnvironment, RunnerError, StepRunner},
    },
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

/// Why a step failed
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

/// What a successful step produced
enum StepSuccess {
    Output(String),
    Published { tag: String, files: Vec<PathBuf> },
}

/// Executes job instances
#[derive(Clone)]
pub struct JobExecutor {
    runner: Arc<dyn StepRunner>,
    publisher: Arc<dyn Publisher>,
    secrets: Arc<HashMap<String, String>>,
}

impl JobExecutor {
    pub fn new(
        runner: Arc<dyn StepRunner>,
        publisher: Arc<dyn Publisher>,
        secrets: Arc<HashMap<String, String>>,
    ) -> Self {
        Self {
            runner,
            publisher,
            secrets,
        }
    }

    /// Run every step of `instance` in order and report what happened
    ///
    /// Steps after a failure are skipped unless guarded by `always()`. The instance owns `env` for its
    /// whole lifetime; nothing is shared with sibling instances.
    pub async fn execute(
        &self,
        steps: &[Step],
        instance: &JobInstance,
        ctx: &RunContext,
        env: &JobEnvironment,
        events: &EventBus,
    ) -> InstanceReport {
        info!("[{}] starting job {}", instance.environment, instance.job_id);

        let mut report = InstanceReport::new(instance.environment.clone(), instance.matrix.clone());
        let mut active_runtime: Option<String> = None;
        let mut failed_step: Option<String> = None;

        for step in steps {
            let started_at = Utc::now();

            let skip_reason = match &failed_step {
                Some(name) if !step.condition.runs_after_failure() => {
                    Some(format!("previous step '{}' failed", name))
                }
                _ if !step.should_run(ctx) => {
                    Some(format!("condition `{}` not met", step.condition))
                }
                _ => None,
            };

            if let Some(reason) = skip_reason {
                debug!("[{}] skipping '{}': {}", instance.environment, step.name, reason);
                events
                    .emit(ExecutionEvent::StepSkipped {
                        job_id: instance.job_id.clone(),
                        environment: instance.environment.clone(),
                        step: step.name.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                report.steps.push(StepReport {
                    name: step.name.clone(),
                    outcome: StepOutcome::Skipped { reason },
                    started_at,
                    finished_at: Utc::now(),
                });
                continue;
            }

            events
                .emit(ExecutionEvent::StepStarted {
                    job_id: instance.job_id.clone(),
                    environment: instance.environment.clone(),
                    step: step.name.clone(),
                })
                .await;

            let result = match timeout(
                Duration::from_secs(step.timeout_secs),
                self.run_step(step, ctx, env, &mut active_runtime),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StepError::Timeout(step.timeout_secs)),
            };

            let outcome = match result {
                Ok(StepSuccess::Output(output)) => {
                    events
                        .emit(ExecutionEvent::StepCompleted {
                            job_id: instance.job_id.clone(),
                            environment: instance.environment.clone(),
                            step: step.name.clone(),
                        })
                        .await;
                    StepOutcome::Succeeded { output }
                }
                Ok(StepSuccess::Published { tag, files }) => {
                    let summary = format!("uploaded {} file(s) to {}", files.len(), tag);
                    events
                        .emit(ExecutionEvent::ArtifactsPublished {
                            job_id: instance.job_id.clone(),
                            environment: instance.environment.clone(),
                            tag,
                            files,
                        })
                        .await;
                    events
                        .emit(ExecutionEvent::StepCompleted {
                            job_id: instance.job_id.clone(),
                            environment: instance.environment.clone(),
                            step: step.name.clone(),
                        })
                        .await;
                    StepOutcome::Succeeded { output: summary }
                }
                Err(e) => {
                    let error = e.to_string();
                    error!("[{}] step '{}' failed: {}", instance.environment, step.name, error);
                    events
                        .emit(ExecutionEvent::StepFailed {
                            job_id: instance.job_id.clone(),
                            environment: instance.environment.clone(),
                            step: step.name.clone(),
                            error: error.clone(),
                        })
                        .await;
                    failed_step.get_or_insert_with(|| step.name.clone());
                    StepOutcome::Failed { error }
                }
            };

            report.steps.push(StepReport {
                name: step.name.clone(),
                outcome,
                started_at,
                finished_at: Utc::now(),
            });
        }

        if report.succeeded() {
            info!("[{}] job {} succeeded", instance.environment, instance.job_id);
        } else {
            warn!("[{}] job {} failed", instance.environment, instance.job_id);
        }

        report
    }

    async fn run_step(
        &self,
        step: &Step,
        ctx: &RunContext,
        env: &JobEnvironment,
        active_runtime: &mut Option<String>,
    ) -> Result<StepSuccess, StepError> {
        if let StepAction::Publish { files, token_env } = &step.action {
            return self.publish(files, token_env, ctx, env).await;
        }

        let commands = step
            .action
            .commands(ctx, active_runtime.as_deref())
            .map_err(RunnerError::from)?;
        let mut output = CommandOutput::default();

        for command in &commands {
            let result = self.runner.run(env, command).await?;
            output.stdout.push_str(&result.stdout);
            output.stderr.push_str(&result.stderr);
        }

        if let StepAction::Runtime { name, version } = &step.action {
            if self.runner.verifies_versions() {
                check_version(name, version, &output)?;
            }
            *active_runtime = Some(name.clone());
        }

        Ok(StepSuccess::Output(output.stdout))
    }

    async fn publish(
        &self,
        files: &str,
        token_env: &str,
        ctx: &RunContext,
        env: &JobEnvironment,
    ) -> Result<StepSuccess, StepError> {
        let tag = ctx
            .git_ref
            .tag_name()
            .ok_or_else(|| PublishError::NotATag(ctx.git_ref.full()))?
            .to_string();

        let token = match self.secrets.get(token_env).filter(|t| !t.is_empty()) {
            Some(token) => token.clone(),
            None if !self.publisher.needs_credentials() => String::new(),
            None => return Err(PublishError::MissingCredential(token_env.to_string()).into()),
        };

        let pattern = ctx.render(files);
        let files = match resolve_artifacts(&pattern, &env.working_dir) {
            Err(PublishError::NoArtifacts(_)) if !self.publisher.needs_artifacts() => Vec::new(),
            result => result?,
        };

        let upload = ReleaseUpload { tag, files, token };
        debug!("[{}] publishing {:?}", env.label, upload);
        self.publisher.publish(&upload, env).await?;

        Ok(StepSuccess::Published {
            tag: upload.tag,
            files: upload.files,
        })
    }
}

fn check_version(name: &str, pin: &VersionPin, output: &CommandOutput) -> Result<(), RunnerError> {
    // Older interpreters print their version on stderr
    let reported = output.combined();
    if pin.matches(&reported) {
        return Ok(());
    }

    Err(RunnerError::RuntimeVersionMismatch {
        runtime: name.to_string(),
        found: VersionPin::extract_version(&reported).unwrap_or_else(|| reported.trim().to_string()),
        expected: pin.to_string(),
    })
}
