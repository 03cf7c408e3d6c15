//! Main execution engine - orchestrates a workflow run

use crate::{
    core::{
        state::{ExecutionStatus, InstanceReport, JobState},
        Event, GitRef, JobInstance, RunContext, Workflow,
    },
    execution::{
        executor::JobExecutor,
        publisher::Publisher,
        runner::{JobEnvironment, StepRunner},
        scheduler::{ExecutionScheduler, SchedulingStrategy},
    },
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: Uuid,
        workflow_name: String,
        git_ref: String,
    },
    RunNotTriggered {
        execution_id: Uuid,
        event: String,
    },
    JobStarted {
        job_id: String,
        environment: String,
    },
    StepStarted {
        job_id: String,
        environment: String,
        step: String,
    },
    StepCompleted {
        job_id: String,
        environment: String,
        step: String,
    },
    StepSkipped {
        job_id: String,
        environment: String,
        step: String,
        reason: String,
    },
    StepFailed {
        job_id: String,
        environment: String,
        step: String,
        error: String,
    },
    InstanceFinished {
        job_id: String,
        environment: String,
        succeeded: bool,
    },
    ArtifactsPublished {
        job_id: String,
        environment: String,
        tag: String,
        files: Vec<PathBuf>,
    },
    JobCompleted {
        job_id: String,
    },
    JobFailed {
        job_id: String,
        error: String,
    },
    JobSkipped {
        job_id: String,
        reason: String,
    },
    RunCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fans events out to registered handlers; cheap to clone into instance tasks
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub async fn emit(&self, event: ExecutionEvent) {
        let handlers = self.handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Engine failures that are not job failures
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow stuck: jobs {0:?} can neither run nor be skipped")]
    Stuck(Vec<String>),

    #[error("job instance task failed: {0}")]
    Task(String),
}

/// Main workflow execution engine
pub struct ExecutionEngine {
    runner: Arc<dyn StepRunner>,
    publisher: Arc<dyn Publisher>,
    secrets: HashMap<String, String>,
    scheduler: ExecutionScheduler,
    working_dir: PathBuf,
    events: EventBus,
}

impl ExecutionEngine {
    pub fn new(runner: Arc<dyn StepRunner>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            runner,
            publisher,
            secrets: HashMap::new(),
            scheduler: ExecutionScheduler::default(),
            working_dir: PathBuf::from("."),
            events: EventBus::new(),
        }
    }

    /// Directory every instance runs in
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Make a secret available to publish steps
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.scheduler = ExecutionScheduler::new(strategy);
        self
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler).await;
    }

    /// Run `workflow` for `event`
    ///
    /// Job failures are recorded in the workflow state, not returned as errors.
    pub async fn execute(&self, workflow: &mut Workflow, event: &Event) -> Result<(), EngineError> {
        let execution_id = workflow.state.execution_id;
        let git_ref = event.git_ref().clone();

        if !workflow.trigger.matches(event) {
            info!("{} does not trigger workflow '{}'", event, workflow.name);
            workflow.state.not_triggered(git_ref.full());
            self.events
                .emit(ExecutionEvent::RunNotTriggered {
                    execution_id,
                    event: event.to_string(),
                })
                .await;
            return Ok(());
        }

        info!("Starting workflow '{}' ({}) for {}", workflow.name, execution_id, event);
        workflow.state.start(workflow.jobs.len(), git_ref.full());
        self.events
            .emit(ExecutionEvent::RunStarted {
                execution_id,
                workflow_name: workflow.name.clone(),
                git_ref: git_ref.full(),
            })
            .await;

        let executor = JobExecutor::new(
            self.runner.clone(),
            self.publisher.clone(),
            Arc::new(self.secrets.clone()),
        );

        while !workflow.is_complete() {
            self.skip_blocked(workflow).await;

            let ready = workflow.ready_jobs();
            if ready.is_empty() {
                if workflow.is_complete() {
                    break;
                }
                let stuck: Vec<String> = workflow
                    .execution_order()
                    .iter()
                    .filter(|id| workflow.job(id).is_some_and(|j| !j.state.is_terminal()))
                    .cloned()
                    .collect();
                error!("No jobs ready to run - workflow stuck: {:?}", stuck);
                workflow.state.fail();
                self.emit_completed(execution_id, ExecutionStatus::Failed).await;
                return Err(EngineError::Stuck(stuck));
            }

            if let Err(e) = self.run_wave(workflow, &ready, &executor, &git_ref).await {
                self.abandon(workflow, &ready, &e.to_string()).await;
                return Err(e);
            }
            workflow.update_counts();
        }

        workflow.update_counts();
        let status = if workflow.has_failures() {
            workflow.state.fail();
            ExecutionStatus::Failed
        } else {
            workflow.state.complete();
            ExecutionStatus::Completed
        };

        info!("Workflow '{}' finished: {:?}", workflow.name, status);
        self.emit_completed(execution_id, status).await;
        Ok(())
    }

    /// Fail the wave's jobs and the run after an instance task was lost
    async fn abandon(&self, workflow: &mut Workflow, ready: &[String], error: &str) {
        let failed_at = Utc::now();
        for job_id in ready {
            let Some(job) = workflow.job_mut(job_id) else {
                continue;
            };
            let started_at = match job.state {
                JobState::Running { started_at } => started_at,
                _ => failed_at,
            };
            job.state = JobState::Failed {
                error: error.to_string(),
                instances: Vec::new(),
                started_at,
                failed_at,
            };
            self.events
                .emit(ExecutionEvent::JobFailed {
                    job_id: job_id.clone(),
                    error: error.to_string(),
                })
                .await;
        }

        workflow.update_counts();
        workflow.state.fail();
        self.emit_completed(workflow.state.execution_id, ExecutionStatus::Failed)
            .await;
    }

    async fn emit_completed(&self, execution_id: Uuid, status: ExecutionStatus) {
        self.events
            .emit(ExecutionEvent::RunCompleted {
                execution_id,
                status,
            })
            .await;
    }

    /// Skip pending jobs whose needs can no longer complete, until nothing changes
    async fn skip_blocked(&self, workflow: &mut Workflow) {
        loop {
            let blocked = workflow.blocked_jobs();
            if blocked.is_empty() {
                return;
            }

            for (job_id, need) in blocked {
                let reason = format!("dependency '{}' did not complete", need);
                warn!("Skipping job {}: {}", job_id, reason);
                if let Some(job) = workflow.job_mut(&job_id) {
                    job.state = JobState::Skipped {
                        reason: reason.clone(),
                    };
                }
                self.events
                    .emit(ExecutionEvent::JobSkipped { job_id, reason })
                    .await;
            }
        }
    }

    /// Run every instance of the ready jobs and record each job's result
    async fn run_wave(
        &self,
        workflow: &mut Workflow,
        ready: &[String],
        executor: &JobExecutor,
        git_ref: &GitRef,
    ) -> Result<(), EngineError> {
        let started_at = Utc::now();
        let mut planned: Vec<(String, JobInstance)> = Vec::new();

        for job_id in ready {
            let Some(job) = workflow.job_mut(job_id) else {
                continue;
            };
            job.state = JobState::Running { started_at };
            planned.extend(job.instances().into_iter().map(|i| (job_id.clone(), i)));
        }

        let permits = self.scheduler.permits(planned.len());
        let mut tasks = JoinSet::new();

        for (index, (job_id, instance)) in planned.into_iter().enumerate() {
            let steps = workflow
                .job(&job_id)
                .map(|j| j.steps.clone())
                .unwrap_or_default();
            let ctx = RunContext::new(
                git_ref.clone(),
                instance.matrix.clone(),
                instance.environment.clone(),
            );
            let env = JobEnvironment {
                label: instance.environment.clone(),
                working_dir: self.working_dir.clone(),
                env: ctx.env_vars(),
            };
            let executor = executor.clone();
            let events = self.events.clone();
            // Taken before spawning: limited strategies start instances in matrix order.
            // The semaphore is never closed.
            let permit = permits.clone().acquire_owned().await.ok();

            tasks.spawn(async move {
                let _permit = permit;
                events
                    .emit(ExecutionEvent::JobStarted {
                        job_id: job_id.clone(),
                        environment: instance.environment.clone(),
                    })
                    .await;
                let report = executor.execute(&steps, &instance, &ctx, &env, &events).await;
                events
                    .emit(ExecutionEvent::InstanceFinished {
                        job_id: job_id.clone(),
                        environment: instance.environment.clone(),
                        succeeded: report.succeeded(),
                    })
                    .await;
                (index, job_id, report)
            });
        }

        let mut results: Vec<(usize, String, InstanceReport)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Job instance task failed: {}", e);
                    tasks.abort_all();
                    return Err(EngineError::Task(e.to_string()));
                }
            }
        }
        // Matrix order, regardless of finishing order
        results.sort_by_key(|(index, _, _)| *index);

        let finished_at = Utc::now();
        for job_id in ready {
            let instances: Vec<InstanceReport> = results
                .iter()
                .filter(|(_, id, _)| id == job_id)
                .map(|(_, _, report)| report.clone())
                .collect();

            let failure = instances.iter().find_map(|report| {
                report
                    .failure()
                    .map(|(step, error)| format!("{}: {}: {}", report.environment, step, error))
            });

            let (state, event) = match failure {
                Some(error) => (
                    JobState::Failed {
                        error: error.clone(),
                        instances,
                        started_at,
                        failed_at: finished_at,
                    },
                    ExecutionEvent::JobFailed {
                        job_id: job_id.clone(),
                        error,
                    },
                ),
                None => (
                    JobState::Completed {
                        instances,
                        started_at,
                        completed_at: finished_at,
                    },
                    ExecutionEvent::JobCompleted {
                        job_id: job_id.clone(),
                    },
                ),
            };

            if let Some(job) = workflow.job_mut(job_id) {
                job.state = state;
            }
            self.events.emit(event).await;
        }

        Ok(())
    }
}
