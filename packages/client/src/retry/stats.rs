//! Retry statistics for monitoring
//!
//! Atomic counters owned by a `RetryManager`; each executor keeps its own set.

use std::sync::atomic::{AtomicU64, Ordering};

/// Retry counters for one manager
#[derive(Debug, Default)]
pub struct RetryStats {
    total_operations: AtomicU64,
    total_retries: AtomicU64,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
}

/// Point-in-time copy of [`RetryStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RetryStatsSnapshot {
    pub operations: u64,
    pub retries: u64,
    pub successes: u64,
    pub failures: u64,
}

impl RetryStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_operations: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_operation(&self) {
        self.total_operations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> RetryStatsSnapshot {
        RetryStatsSnapshot {
            operations: self.total_operations.load(Ordering::Relaxed),
            retries: self.total_retries.load(Ordering::Relaxed),
            successes: self.total_successes.load(Ordering::Relaxed),
            failures: self.total_failures.load(Ordering::Relaxed),
        }
    }

    /// Average retry attempts per operation; 0.0 before any operation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_retries_per_operation(&self) -> f64 {
        let snapshot = self.snapshot();
        if snapshot.operations > 0 {
            snapshot.retries as f64 / snapshot.operations as f64
        } else {
            0.0
        }
    }

    /// Clears all counters.
    pub fn reset(&self) {
        self.total_operations.store(0, Ordering::Relaxed);
        self.total_retries.store(0, Ordering::Relaxed);
        self.total_successes.store(0, Ordering::Relaxed);
        self.total_failures.store(0, Ordering::Relaxed);
    }
}
