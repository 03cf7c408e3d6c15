//! Step domain model

use crate::core::{
    condition::Condition,
    config::StepConfig,
    context::RunContext,
};
use anyhow::Result;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static VERSION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)*").expect("valid version pattern"));

/// A single step of a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Display name
    pub name: String,

    /// Guard evaluated against the triggering ref
    pub condition: Condition,

    /// What the step does
    pub action: StepAction,

    /// Timeout in seconds
    pub timeout_secs: u64,
}

/// The action a step performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Install a toolchain release channel and select it for the working directory
    Toolchain { channel: String },
    /// Check a scripting runtime is available at the pinned version
    Runtime { name: String, version: VersionPin },
    /// Install a tool through a runtime's package installer
    Install { tool: String, runtime: Option<String> },
    /// Run a shell command
    Run { command: String },
    /// Upload matching files to the release of the triggering tag
    Publish { files: String, token_env: String },
}

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run `command` through the platform shell
    pub fn shell(command: &str) -> Self {
        if cfg!(windows) {
            Self::new("cmd", ["/C", command])
        } else {
            Self::new("sh", ["-c", command])
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runtime version pin: `3.x` (major), `3.11` (prefix), or `*` (any)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPin(String);

impl VersionPin {
    pub fn new(pin: &str) -> Self {
        let pin = pin.trim();
        let pin = pin
            .strip_suffix(".x")
            .or_else(|| pin.strip_suffix(".*"))
            .unwrap_or(pin);
        let pin = if pin == "x" { "*" } else { pin };
        VersionPin(pin.to_string())
    }

    pub fn any() -> Self {
        VersionPin("*".to_string())
    }

    /// Check a `--version` report such as `Python 3.11.4`
    pub fn matches(&self, reported: &str) -> bool {
        if self.0.is_empty() || self.0 == "*" {
            return true;
        }

        match Self::extract_version(reported) {
            Some(found) => found == self.0 || found.starts_with(&format!("{}.", self.0)),
            None => false,
        }
    }

    /// First dotted version number in a report
    pub fn extract_version(reported: &str) -> Option<String> {
        VERSION_NUMBER
            .find(reported)
            .map(|m| m.as_str().to_string())
    }
}

impl fmt::Display for VersionPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == "*" || self.0.is_empty() {
            write!(f, "any version")
        } else {
            write!(f, "{}.x", self.0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 3600, // 60 minutes
        }
    }
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Result<Self> {
        let action = if let Some(channel) = &config.toolchain {
            StepAction::Toolchain {
                channel: channel.clone(),
            }
        } else if let Some(runtime) = &config.runtime {
            StepAction::Runtime {
                name: runtime.name.clone(),
                version: runtime
                    .version
                    .as_deref()
                    .map(VersionPin::new)
                    .unwrap_or_else(VersionPin::any),
            }
        } else if let Some(install) = &config.install {
            StepAction::Install {
                tool: install.tool.clone(),
                runtime: install.runtime.clone(),
            }
        } else if let Some(command) = &config.run {
            StepAction::Run {
                command: command.clone(),
            }
        } else if let Some(publish) = &config.publish {
            StepAction::Publish {
                files: publish.files.clone(),
                token_env: publish.token_env.clone(),
            }
        } else {
            anyhow::bail!("Step has no action");
        };

        let condition = match &config.condition {
            Some(expression) => Condition::parse(expression)?,
            None => Condition::Success,
        };

        let name = config
            .name
            .clone()
            .unwrap_or_else(|| action.default_name());

        Ok(Step {
            name,
            condition,
            action,
            timeout_secs: config
                .timeout_minutes
                .map(|m| m.saturating_mul(60))
                .unwrap_or(defaults.timeout_secs),
        })
    }

    /// Whether the step's condition holds for this run
    pub fn should_run(&self, ctx: &RunContext) -> bool {
        self.condition.evaluate(&ctx.git_ref)
    }
}

impl StepAction {
    fn default_name(&self) -> String {
        match self {
            StepAction::Toolchain { channel } => format!("Install {} toolchain", channel),
            StepAction::Runtime { name, version } => format!("Set up {} ({})", name, version),
            StepAction::Install { tool, .. } => format!("Install {}", tool),
            StepAction::Run { command } => command.clone(),
            StepAction::Publish { files, .. } => format!("Publish {}", files),
        }
    }

    /// Commands this action runs, in order
    ///
    /// `active_runtime` is the last runtime provisioned in the job. Publishing
    /// has no commands of its own, it goes through the publisher.
    pub fn commands(
        &self,
        ctx: &RunContext,
        active_runtime: Option<&str>,
    ) -> Result<Vec<CommandSpec>, MissingRuntime> {
        Ok(match self {
            StepAction::Toolchain { channel } => vec![
                CommandSpec::new(
                    "rustup",
                    ["toolchain", "install", channel.as_str(), "--profile", "minimal"],
                ),
                CommandSpec::new("rustup", ["override", "set", channel.as_str()]),
            ],
            StepAction::Runtime { name, .. } => vec![CommandSpec::new(name, ["--version"])],
            StepAction::Install { tool, runtime } => {
                let runtime = runtime
                    .as_deref()
                    .or(active_runtime)
                    .ok_or_else(|| MissingRuntime(tool.clone()))?;
                vec![CommandSpec::new(
                    runtime,
                    ["-m", "pip", "install", tool.as_str()],
                )]
            }
            StepAction::Run { command } => vec![CommandSpec::shell(&ctx.render(command))],
            StepAction::Publish { .. } => Vec::new(),
        })
    }
}

/// An install step ran before any runtime was provisioned
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no runtime provisioned to install {0}")]
pub struct MissingRuntime(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{InstallConfig, RuntimeConfig};
    use crate::core::trigger::GitRef;
    use std::collections::BTreeMap;

    fn ctx(git_ref: GitRef) -> RunContext {
        let mut matrix = BTreeMap::new();
        matrix.insert("os".to_string(), "ubuntu-latest".to_string());
        RunContext::new(git_ref, matrix, "ubuntu-latest".to_string())
    }

    #[test]
    fn test_toolchain_commands() {
        let config = StepConfig {
            toolchain: Some("nightly".to_string()),
            ..Default::default()
        };
        let step = Step::from_config(&config, &StepDefaults::default()).unwrap();

        assert_eq!(step.name, "Install nightly toolchain");
        let commands = step
            .action
            .commands(&ctx(GitRef::tag("v1.0.0")), None)
            .unwrap();
        assert_eq!(
            commands[0].to_string(),
            "rustup toolchain install nightly --profile minimal"
        );
        assert_eq!(commands[1].to_string(), "rustup override set nightly");
    }

    #[test]
    fn test_run_command_is_rendered() {
        let config = StepConfig {
            run: Some("echo ${{ matrix.os }} ${{ github.ref_name }}".to_string()),
            ..Default::default()
        };
        let step = Step::from_config(&config, &StepDefaults::default()).unwrap();
        let commands = step
            .action
            .commands(&ctx(GitRef::tag("v1.0.0")), None)
            .unwrap();

        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].args.last().map(String::as_str),
            Some("echo ubuntu-latest v1.0.0")
        );
    }

    #[test]
    fn test_install_uses_active_runtime() {
        let config = StepConfig {
            install: Some(InstallConfig {
                tool: "maturin".to_string(),
                runtime: None,
            }),
            ..Default::default()
        };
        let step = Step::from_config(&config, &StepDefaults::default()).unwrap();
        let context = ctx(GitRef::tag("v1.0.0"));

        let commands = step.action.commands(&context, Some("python3")).unwrap();
        assert_eq!(commands[0].to_string(), "python3 -m pip install maturin");

        assert_eq!(
            step.action.commands(&context, None),
            Err(MissingRuntime("maturin".to_string()))
        );
    }

    #[test]
    fn test_condition_and_timeout() {
        let config = StepConfig {
            name: Some("Upload".to_string()),
            condition: Some("startsWith(github.ref, 'refs/tags/')".to_string()),
            timeout_minutes: Some(5),
            run: Some("true".to_string()),
            ..Default::default()
        };
        let step = Step::from_config(&config, &StepDefaults::default()).unwrap();

        assert_eq!(step.timeout_secs, 300);
        assert!(step.should_run(&ctx(GitRef::tag("v1.0.0"))));
        assert!(!step.should_run(&ctx(GitRef::branch("main"))));
    }

    #[test]
    fn test_version_pins() {
        let major = VersionPin::new("3.x");
        assert!(major.matches("Python 3.11.4"));
        assert!(major.matches("Python 3"));
        assert!(!major.matches("Python 2.7.18"));
        assert!(!major.matches("Python 30.1"));

        let minor = VersionPin::new("3.11");
        assert!(minor.matches("Python 3.11.4"));
        assert!(!minor.matches("Python 3.1.4"));

        assert!(VersionPin::new("*").matches("whatever"));
        assert!(!major.matches("no version here"));
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(
            VersionPin::extract_version("Python 3.12.1"),
            Some("3.12.1".to_string())
        );
        assert_eq!(
            VersionPin::extract_version("rustc 1.80.0-nightly (2024-05-01)"),
            Some("1.80.0".to_string())
        );
        assert_eq!(VersionPin::extract_version("unknown"), None);
    }

    #[test]
    fn test_runtime_default_pin() {
        let config = StepConfig {
            runtime: Some(RuntimeConfig {
                name: "python3".to_string(),
                version: None,
            }),
            ..Default::default()
        };
        let step = Step::from_config(&config, &StepDefaults::default()).unwrap();
        assert_eq!(
            step.action,
            StepAction::Runtime {
                name: "python3".to_string(),
                version: VersionPin::any()
            }
        );
    }
}
