//! Step runners - execute commands for a job instance

use crate::core::CommandSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Error types for command execution
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("`{command}` exited with status {code}: {stderr}")]
    ExitStatus {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{runtime} reported '{found}', expected {expected}")]
    RuntimeVersionMismatch {
        runtime: String,
        found: String,
        expected: String,
    },

    #[error(transparent)]
    MissingRuntime(#[from] crate::core::step::MissingRuntime),

    #[error("failed to decode output of `{command}`: {message}")]
    Output { command: String, message: String },
}

/// The environment a job instance owns for its lifetime
#[derive(Debug, Clone)]
pub struct JobEnvironment {
    /// Environment label (e.g. `ubuntu-latest`)
    pub label: String,

    /// Directory commands run in
    pub working_dir: PathBuf,

    /// Variables exported to every command
    pub env: Vec<(String, String)>,
}

/// Captured output of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// stdout followed by stderr, for tools that report on either
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run one command in the given environment
    async fn run(
        &self,
        env: &JobEnvironment,
        command: &CommandSpec,
    ) -> Result<CommandOutput, RunnerError>;

    /// Whether runtime version reports from this runner are real
    fn verifies_versions(&self) -> bool {
        true
    }
}

/// Runs commands as local subprocesses
///
/// The environment label is informational: every instance runs on the host.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepRunner for ProcessRunner {
    async fn run(
        &self,
        env: &JobEnvironment,
        command: &CommandSpec,
    ) -> Result<CommandOutput, RunnerError> {
        let command_line = command.to_string();
        debug!("[{}] spawning `{}`", env.label, command_line);

        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&env.working_dir)
            .envs(env.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RunnerError::Spawn {
                command: command_line.clone(),
                message: e.to_string(),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        // Check exit code
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!("[{}] `{}` exited with code {}", env.label, command_line, code);
            return Err(RunnerError::ExitStatus {
                command: command_line,
                code,
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| RunnerError::Output {
            command: command_line.clone(),
            message: e.to_string(),
        })?;

        debug!("[{}] `{}` returned {} bytes", env.label, command_line, stdout.len());

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Logs commands instead of running them
#[derive(Debug, Default)]
pub struct DryRunRunner {
    commands: Mutex<Vec<(String, String)>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands seen so far, as `(environment, command)` pairs
    pub fn commands(&self) -> Vec<(String, String)> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StepRunner for DryRunRunner {
    async fn run(
        &self,
        env: &JobEnvironment,
        command: &CommandSpec,
    ) -> Result<CommandOutput, RunnerError> {
        info!("[{}] (dry run) {}", env.label, command);
        if let Ok(mut commands) = self.commands.lock() {
            commands.push((env.label.clone(), command.to_string()));
        }
        Ok(CommandOutput::default())
    }

    fn verifies_versions(&self) -> bool {
        false
    }
}
