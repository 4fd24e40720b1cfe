use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub(crate) created: AtomicU64,
    pub(crate) reused: AtomicU64,
    pub(crate) closed: AtomicU64,
    pub(crate) create_failures: AtomicU64,
    pub(crate) waited: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Pool occupancy and lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub waiting: usize,
    pub created: u64,
    pub reused: u64,
    pub closed: u64,
    pub create_failures: u64,
    /// Acquisitions that had to queue
    pub waited: u64,
}

impl PoolStats {
    pub(crate) fn from_counters(
        counters: &PoolCounters,
        total: usize,
        active: usize,
        idle: usize,
        waiting: usize,
    ) -> Self {
        Self {
            total,
            active,
            idle,
            waiting,
            created: counters.created.load(Ordering::Relaxed),
            reused: counters.reused.load(Ordering::Relaxed),
            closed: counters.closed.load(Ordering::Relaxed),
            create_failures: counters.create_failures.load(Ordering::Relaxed),
            waited: counters.waited.load(Ordering::Relaxed),
        }
    }
}
