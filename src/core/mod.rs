//! Core domain models for release workflows
//!
//! This module defines the workflow, job, and step structures loaded from
//! YAML, the trigger gate, step conditions, and run state.

pub mod condition;
pub mod config;
pub mod context;
pub mod job;
pub mod state;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use condition::Condition;
pub use context::RunContext;
pub use job::{Job, JobInstance};
pub use state::*;
pub use step::{CommandSpec, Step, StepAction};
pub use trigger::{Event, GitRef, Trigger};
pub use workflow::Workflow;
