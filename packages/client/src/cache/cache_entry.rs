//! Cached response with freshness and access metadata

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::http::ResponseData;

/// One cached response.
///
/// `created_at`/`last_accessed` are monotonic instants used for expiry and
/// eviction; `timestamp` is the wall-clock creation time written to
/// persistent stores.
#[derive(Debug, Clone)]
pub struct CacheItem {
    pub response: ResponseData,
    pub timestamp: DateTime<Utc>,
    pub created_at: Instant,
    pub ttl: Duration,
    pub last_accessed: Instant,
    pub access_count: u64,
    /// Estimated footprint in bytes (body plus header overhead)
    pub size: u64,
    pub tags: BTreeSet<String>,
}

impl CacheItem {
    pub fn new(response: ResponseData, ttl: Duration, tags: BTreeSet<String>) -> Self {
        let now = Instant::now();
        let size = Self::estimate_size(&response);
        Self {
            response,
            timestamp: Utc::now(),
            created_at: now,
            ttl,
            last_accessed: now,
            access_count: 0,
            size,
            tags,
        }
    }

    fn estimate_size(response: &ResponseData) -> u64 {
        let headers: usize = response
            .headers()
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        (response.size() + headers + 64) as u64
    }

    /// Expired once `ttl` has fully elapsed.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Instant at which the entry stops being served, `None` if that lies
    /// beyond what `Instant` can represent.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.created_at.checked_add(self.ttl)
    }

    /// Freshness left at `now`; zero once expired.
    #[must_use]
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl.saturating_sub(now.saturating_duration_since(self.created_at))
    }

    pub fn record_hit(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count += 1;
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
