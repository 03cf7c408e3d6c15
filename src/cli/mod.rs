//! Command-line interface

pub mod commands;
pub mod output;

use crate::core::config::{WorkflowConfig, DEFAULT_WORKFLOW_FILE};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{HistoryCommand, PlanCommand, QueryCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::Path;

/// Solr subquery composition and release pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "solr-subquery")]
#[command(version)]
#[command(about = "Compose Solr subqueries and run the tag-triggered release workflow", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow for a ref
    Run(RunCommand),

    /// Show the stages, instances and steps a run would execute
    Plan(PlanCommand),

    /// Validate a workflow configuration
    Validate(ValidateCommand),

    /// Show run history
    History(HistoryCommand),

    /// Compose Solr queries
    Query(QueryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

/// Load the workflow from `file`, else `./release.yml`, else the built-in one
pub fn load_workflow_config(file: Option<&str>) -> Result<WorkflowConfig> {
    if let Some(file) = file {
        return WorkflowConfig::from_file(file)
            .with_context(|| format!("Failed to load workflow {}", file));
    }

    if Path::new(DEFAULT_WORKFLOW_FILE).is_file() {
        return WorkflowConfig::from_file(DEFAULT_WORKFLOW_FILE)
            .with_context(|| format!("Failed to load workflow {}", DEFAULT_WORKFLOW_FILE));
    }

    WorkflowConfig::default_release()
}
