//! Counters for the query runner.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-lifetime runner counters.
#[derive(Debug, Default)]
pub struct RunnerMetrics {
    /// Calls to `run`.
    pub calls: AtomicU64,

    /// Operation executions, retries included.
    pub attempts: AtomicU64,

    /// Retries scheduled after a rate-limited attempt.
    pub retries: AtomicU64,

    /// Attempts delayed by the self-throttle.
    pub throttled: AtomicU64,

    /// Calls that served the fallback after exhausting retries.
    pub exhausted: AtomicU64,

    /// Calls that ended with a terminal error.
    pub terminal: AtomicU64,

    /// Calls that succeeded.
    pub succeeded: AtomicU64,
}

impl RunnerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> RunnerMetricsSnapshot {
        RunnerMetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            terminal: self.terminal.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of runner metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerMetricsSnapshot {
    pub calls: u64,
    pub attempts: u64,
    pub retries: u64,
    pub throttled: u64,
    pub exhausted: u64,
    pub terminal: u64,
    pub succeeded: u64,
}
