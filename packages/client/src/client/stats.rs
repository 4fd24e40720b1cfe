//! Executor statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::cache::CacheStatsSnapshot;
use crate::dedup::DedupStats;
use crate::pool::PoolStats;
use crate::queue::QueueStatus;
use crate::retry::RetryStatsSnapshot;

/// Request counters kept by the executor.
#[derive(Debug)]
pub struct ClientStats {
    pub requests_total: AtomicU64,
    pub requests_successful: AtomicU64,
    pub requests_failed: AtomicU64,
    pub requests_cancelled: AtomicU64,
    /// Served straight from the response cache
    pub cache_hits: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    /// Sum of end-to-end durations of settled requests
    pub total_duration_ms: AtomicU64,
    pub created_at: Instant,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_successful: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_cancelled: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Returns the running total including this request.
    pub fn record_request(&self) -> u64 {
        self.requests_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_success(&self, bytes_received: u64, elapsed: Duration) {
        self.requests_successful.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes_received, Ordering::Relaxed);
        self.record_duration(elapsed);
    }

    pub fn record_failure(&self, elapsed: Duration) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_duration(elapsed);
    }

    pub fn record_cancelled(&self) {
        self.requests_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_duration(&self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
    }

    /// Successful share of settled requests.
    pub fn success_ratio(&self) -> f64 {
        let successful = self.requests_successful.load(Ordering::Relaxed);
        let settled = successful
            + self.requests_failed.load(Ordering::Relaxed)
            + self.requests_cancelled.load(Ordering::Relaxed);
        if settled == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                successful as f64 / settled as f64
            }
        }
    }

    pub fn average_duration_ms(&self) -> f64 {
        let settled = self.requests_successful.load(Ordering::Relaxed)
            + self.requests_failed.load(Ordering::Relaxed);
        if settled == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.total_duration_ms.load(Ordering::Relaxed) as f64 / settled as f64
        }
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Point-in-time view of the executor and every stage it drives.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatsSnapshot {
    pub requests_total: u64,
    pub requests_successful: u64,
    pub requests_failed: u64,
    pub requests_cancelled: u64,
    pub cache_hits: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub success_ratio: f64,
    pub average_duration_ms: f64,
    /// Requests registered for cancellation, i.e. not yet settled
    pub active_requests: usize,
    #[serde(with = "crate::config::serde_millis")]
    pub age: Duration,
    pub cache: CacheStatsSnapshot,
    pub queue: QueueStatus,
    pub pool: PoolStats,
    pub retry: RetryStatsSnapshot,
    pub dedup: DedupStats,
}

impl ClientStatsSnapshot {
    pub(crate) fn collect(
        stats: &ClientStats,
        active_requests: usize,
        cache: CacheStatsSnapshot,
        queue: QueueStatus,
        pool: PoolStats,
        retry: RetryStatsSnapshot,
        dedup: DedupStats,
    ) -> Self {
        Self {
            requests_total: stats.requests_total.load(Ordering::Relaxed),
            requests_successful: stats.requests_successful.load(Ordering::Relaxed),
            requests_failed: stats.requests_failed.load(Ordering::Relaxed),
            requests_cancelled: stats.requests_cancelled.load(Ordering::Relaxed),
            cache_hits: stats.cache_hits.load(Ordering::Relaxed),
            bytes_sent: stats.bytes_sent.load(Ordering::Relaxed),
            bytes_received: stats.bytes_received.load(Ordering::Relaxed),
            success_ratio: stats.success_ratio(),
            average_duration_ms: stats.average_duration_ms(),
            active_requests,
            age: stats.age(),
            cache,
            queue,
            pool,
            retry,
            dedup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_count_settled_requests_only() {
        let stats = ClientStats::new();
        assert_eq!(stats.record_request(), 1);
        stats.record_request();
        stats.record_request();
        assert!(stats.success_ratio().abs() < f64::EPSILON);

        stats.record_success(10, Duration::from_millis(30));
        stats.record_failure(Duration::from_millis(10));
        assert!((stats.success_ratio() - 0.5).abs() < f64::EPSILON);
        assert!((stats.average_duration_ms() - 20.0).abs() < f64::EPSILON);
        assert_eq!(stats.bytes_received.load(Ordering::Relaxed), 10);
    }
}
