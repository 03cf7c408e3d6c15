//! Workflow execution engine

pub mod engine;
pub mod executor;
pub mod publisher;
pub mod runner;
pub mod scheduler;

pub use engine::{EngineError, EventBus, ExecutionEngine, ExecutionEvent};
pub use executor::{JobExecutor, StepError};
pub use publisher::{
    resolve_artifacts, DryRunPublisher, GhReleasePublisher, PublishError, Publisher, ReleaseUpload,
};
pub use runner::{CommandOutput, DryRunRunner, JobEnvironment, ProcessRunner, RunnerError, StepRunner};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
