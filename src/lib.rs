//! solr-subquery - compose Solr subqueries into inner joins, and run the
//! tag-triggered workflow that tests and releases them

#[cfg(feature = "python")]
pub mod bindings;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod query;

// Re-export commonly used types
pub use core::{Event, ExecutionStatus, GitRef, Job, JobInstance, Workflow};
pub use execution::{ExecutionEngine, ExecutionEvent, Publisher, SchedulingStrategy, StepRunner};
pub use query::{Operator, QueryChain, SolrQuery, SolrSubqueryError, SubQuery};
