//! Test utilities for workflow scenarios

use async_trait::async_trait;
use solr_subquery::core::config::WorkflowConfig;
use solr_subquery::core::{CommandSpec, Event, InstanceReport, JobState, StepOutcome, Workflow};
use solr_subquery::execution::{
    CommandOutput, ExecutionEngine, ExecutionEvent, JobEnvironment, PublishError, Publisher,
    ReleaseUpload, RunnerError, SchedulingStrategy, StepRunner,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A command seen by the scripted runner
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub seq: usize,
    pub environment: String,
    pub command: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Runner that succeeds unless a failure rule matches
pub struct ScriptedRunner {
    /// `(environment or any, command substring)`
    failures: Vec<(Option<String>, String)>,
    version_report: String,
    delay: Option<Duration>,
    counter: AtomicUsize,
    log: Mutex<Vec<RecordedCommand>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            failures: Vec::new(),
            version_report: "Python 3.12.1".to_string(),
            delay: None,
            counter: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Fail every command containing `needle`
    pub fn failing(mut self, needle: &str) -> Self {
        self.failures.push((None, needle.to_string()));
        self
    }

    /// Fail commands containing `needle` only on `environment`
    pub fn failing_on(mut self, environment: &str, needle: &str) -> Self {
        self.failures
            .push((Some(environment.to_string()), needle.to_string()));
        self
    }

    pub fn with_version_report(mut self, report: &str) -> Self {
        self.version_report = report.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.log.lock().unwrap().clone()
    }

    pub fn commands_on(&self, environment: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.environment == environment)
            .map(|c| c.command)
            .collect()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.command.contains(needle))
    }

    /// From the first start to the last finish of the matching commands on `environment`
    pub fn span(&self, environment: &str, needles: &[&str]) -> (Instant, Instant) {
        let matching: Vec<RecordedCommand> = self
            .commands()
            .into_iter()
            .filter(|c| c.environment == environment)
            .filter(|c| needles.iter().any(|n| c.command.contains(n)))
            .collect();
        let started = matching.iter().map(|c| c.started).min().unwrap();
        let finished = matching.iter().map(|c| c.finished).max().unwrap();
        (started, finished)
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run(
        &self,
        env: &JobEnvironment,
        command: &CommandSpec,
    ) -> Result<CommandOutput, RunnerError> {
        let line = command.to_string();
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.log.lock().unwrap().push(RecordedCommand {
            seq,
            environment: env.label.clone(),
            command: line.clone(),
            started,
            finished: Instant::now(),
        });

        let fails = self.failures.iter().any(|(environment, needle)| {
            environment.as_deref().map_or(true, |e| e == env.label) && line.contains(needle.as_str())
        });
        if fails {
            return Err(RunnerError::ExitStatus {
                command: line,
                code: 101,
                stderr: "scripted failure".to_string(),
            });
        }

        if line.ends_with("--version") {
            return Ok(CommandOutput::new(self.version_report.clone()));
        }
        Ok(CommandOutput::new(format!("ran {}\n", line)))
    }
}

/// Publisher that records uploads
#[derive(Default)]
pub struct RecordingPublisher {
    uploads: Mutex<Vec<(String, String, Vec<PathBuf>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(environment, tag, files)` per upload
    pub fn uploads(&self) -> Vec<(String, String, Vec<PathBuf>)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        upload: &ReleaseUpload,
        env: &JobEnvironment,
    ) -> Result<(), PublishError> {
        self.uploads
            .lock()
            .unwrap()
            .push((env.label.clone(), upload.tag.clone(), upload.files.clone()));
        Ok(())
    }
}

/// Everything a scenario needs to run the release workflow
pub struct Harness {
    pub runner: Arc<ScriptedRunner>,
    pub publisher: Arc<RecordingPublisher>,
    pub events: Arc<Mutex<Vec<ExecutionEvent>>>,
    pub workdir: TempDir,
    pub token: Option<String>,
    pub strategy: SchedulingStrategy,
}

impl Harness {
    pub fn new(runner: ScriptedRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            publisher: Arc::new(RecordingPublisher::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            workdir: TempDir::new().unwrap(),
            token: Some("ghp_test".to_string()),
            strategy: SchedulingStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn without_token(mut self) -> Self {
        self.token = None;
        self
    }

    /// Put built wheels where the publish step looks for them
    pub fn with_wheels(self, names: &[&str]) -> Self {
        write_wheels(self.workdir.path(), names);
        self
    }

    pub async fn run(&self, workflow: &mut Workflow, event: Event) {
        let mut engine = ExecutionEngine::new(self.runner.clone(), self.publisher.clone())
            .with_working_dir(self.workdir.path())
            .with_strategy(self.strategy);
        if let Some(token) = &self.token {
            engine = engine.with_secret("GITHUB_TOKEN", token.clone());
        }

        let sink = self.events.clone();
        engine
            .add_event_handler(move |event| sink.lock().unwrap().push(event))
            .await;

        engine.execute(workflow, &event).await.unwrap();
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }
}

pub fn write_wheels(dir: &Path, names: &[&str]) {
    let wheels = dir.join("target/wheels");
    std::fs::create_dir_all(&wheels).unwrap();
    for name in names {
        std::fs::write(wheels.join(name), b"wheel").unwrap();
    }
}

pub fn release_workflow() -> Workflow {
    WorkflowConfig::default_release()
        .unwrap()
        .to_workflow()
        .unwrap()
}

/// The release workflow, also startable by hand
pub fn dispatchable_release_workflow() -> Workflow {
    let mut config = WorkflowConfig::default_release().unwrap();
    config.trigger.workflow_dispatch = true;
    config.validate().unwrap();
    config.to_workflow().unwrap()
}

pub fn instances<'a>(workflow: &'a Workflow, job_id: &str) -> &'a [InstanceReport] {
    workflow.job(job_id).unwrap().state.instances()
}

pub fn step_outcome<'a>(instance: &'a InstanceReport, step: &str) -> &'a StepOutcome {
    &instance
        .step(step)
        .unwrap_or_else(|| panic!("no step '{}' in {}", step, instance.environment))
        .outcome
}

/// Whether two `(start, end)` intervals share any instant
pub fn overlaps(a: (Instant, Instant), b: (Instant, Instant)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

pub fn assert_skipped(workflow: &Workflow, job_id: &str) {
    match &workflow.job(job_id).unwrap().state {
        JobState::Skipped { .. } => {}
        other => panic!("expected {} to be skipped, got {:?}", job_id, other),
    }
}
