//! Execution scheduler - decides how many job instances run at once

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Strategy for scheduling instance execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Run instances one at a time, in matrix order
    Sequential,

    /// Run every instance of a wave at once
    Parallel,

    /// Limited parallelism (max N concurrent instances)
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

/// Hands out concurrency permits for job instances
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Maximum instances allowed to run together in a wave of `pending` instances
    pub fn concurrency(&self, pending: usize) -> usize {
        let limit = match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => pending,
            SchedulingStrategy::LimitedParallel(max) => max.min(pending),
        };
        limit.max(1)
    }

    /// Semaphore sized for a wave of `pending` instances
    pub fn permits(&self, pending: usize) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.concurrency(pending)))
    }
}

impl Default for ExecutionScheduler {
    fn default() -> Self {
        Self::new(SchedulingStrategy::default())
    }
}
