//! Execution statistics across retried runs.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// Point-in-time copy of the counters in [`ExecutionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Attempts started, including the initial one of each run.
    pub attempts: u64,
    /// Retries whose delay completed, so the next attempt started.
    pub retries: u64,
    /// Attempts that hit their deadline.
    pub timeouts: u64,
    /// Runs that returned a value.
    pub successes: u64,
    /// Runs that ended in an error.
    pub failures: u64,
}

/// Tracks cumulative attempt and outcome counts.
///
/// Cloning shares the underlying counters, so one instance can be attached
/// to several executors.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    inner: Arc<RwLock<StatsSnapshot>>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.write().attempts += 1;
    }

    pub fn record_retry(&self) {
        self.write().retries += 1;
    }

    pub fn record_timeout(&self) {
        self.write().timeouts += 1;
    }

    pub fn record_success(&self) {
        self.write().successes += 1;
    }

    pub fn record_failure(&self) {
        self.write().failures += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset all counters.
    pub fn reset(&self) {
        *self.write() = StatsSnapshot::default();
    }

    fn write(&self) -> RwLockWriteGuard<'_, StatsSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
