//! CLI command definitions

use crate::core::{Event, GitRef};
use crate::execution::SchedulingStrategy;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Which ref the run is for
#[derive(Debug, Args, Clone, Default)]
#[group(multiple = false)]
pub struct RefArgs {
    /// Full ref (e.g. `refs/tags/v1.2.3`); defaults to $GITHUB_REF
    #[arg(long = "ref")]
    pub git_ref: Option<String>,

    /// Tag name (shorthand for `--ref refs/tags/<TAG>`)
    #[arg(long)]
    pub tag: Option<String>,

    /// Branch name (shorthand for `--ref refs/heads/<BRANCH>`)
    #[arg(long)]
    pub branch: Option<String>,
}

impl RefArgs {
    pub fn git_ref(&self) -> Result<GitRef> {
        if let Some(tag) = &self.tag {
            return Ok(GitRef::tag(tag));
        }
        if let Some(branch) = &self.branch {
            return Ok(GitRef::branch(branch));
        }
        if let Some(reference) = &self.git_ref {
            return Ok(GitRef::parse(reference));
        }
        match std::env::var("GITHUB_REF") {
            Ok(reference) if !reference.is_empty() => Ok(GitRef::parse(&reference)),
            _ => anyhow::bail!("No ref given: pass --ref, --tag or --branch, or set GITHUB_REF"),
        }
    }

    /// A push of the ref, or a manual run against it
    pub fn event(&self, manual: bool) -> Result<Event> {
        let git_ref = self.git_ref()?;
        Ok(if manual {
            Event::Manual(git_ref)
        } else {
            Event::Push(git_ref)
        })
    }
}

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file (defaults to ./release.yml, then the built-in workflow)
    #[arg(short, long)]
    pub file: Option<String>,

    #[command(flatten)]
    pub refs: RefArgs,

    /// Treat the run as started by hand rather than by a push
    #[arg(long)]
    pub manual: bool,

    /// Print commands and uploads instead of performing them
    #[arg(long)]
    pub dry_run: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Directory job instances run in
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Scheduling strategy for job instances
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Instance limit for `parallel-limited`
    #[arg(long, default_value_t = 2)]
    pub max_parallel: usize,
}

/// Show what a run would do without running it
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: Option<String>,

    #[command(flatten)]
    pub refs: RefArgs,

    /// Plan a manual run
    #[arg(long)]
    pub manual: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate a workflow configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single run
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Compose Solr queries
#[derive(Debug, Args, Clone)]
pub struct QueryCommand {
    #[command(subcommand)]
    pub action: QueryAction,
}

#[derive(Debug, Subcommand, Clone)]
pub enum QueryAction {
    /// Inner join of two or more queries, printed with its inverse
    Join {
        #[arg(required = true, num_args = 2..)]
        urls: Vec<String>,
    },

    /// Print every intermediate join of a query chain
    Chain {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Print the negation of a query
    Inverse { url: String },
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

impl SchedulingStrategyArg {
    pub fn with_limit(self, max_parallel: usize) -> SchedulingStrategy {
        match self {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => {
                SchedulingStrategy::LimitedParallel(max_parallel)
            }
        }
    }
}
