//! Cacheability, freshness and eviction decisions

use std::time::Duration;

use chrono::Utc;
use http::StatusCode;
use http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::cache_entry::CacheItem;
use super::cache_key::CacheKey;
use super::http_date::parse_http_date;
use crate::error::Error;
use crate::http::{RequestConfig, ResponseData};

/// Decides what the cache may store, for how long, and under which key.
pub trait CachePolicy: Send + Sync {
    /// Whether a request may be answered from, or populate, the cache.
    fn is_cacheable_request(&self, config: &RequestConfig) -> bool;

    /// Whether a response to a cacheable request may be stored.
    fn is_cacheable_response(&self, response: &ResponseData) -> bool;

    /// Time to live for `response`, falling back to `default`.
    fn ttl(&self, config: &RequestConfig, response: &ResponseData, default: Duration) -> Duration;

    fn key(&self, config: &RequestConfig) -> Result<CacheKey, Error> {
        CacheKey::from_config(config)
    }
}

/// GET/HEAD with a 2xx answer, honouring `Cache-Control` and `Expires`.
///
/// A per-request [`CacheOverride`](crate::http::CacheOverride) can opt out
/// or pin the TTL; a pinned TTL beats response headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCachePolicy;

/// Upper bound on any header-derived TTL.
pub const MAX_HEADER_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

impl DefaultCachePolicy {
    fn directives(response: &ResponseData) -> Vec<String> {
        response
            .headers()
            .get_all(CACHE_CONTROL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(|directive| directive.trim().to_ascii_lowercase())
            .filter(|directive| !directive.is_empty())
            .collect()
    }

    fn max_age(directives: &[String]) -> Option<Duration> {
        let lookup = |prefix: &str| {
            directives
                .iter()
                .find_map(|d| d.strip_prefix(prefix))
                .and_then(|secs| secs.trim_matches('"').parse::<u64>().ok())
        };
        lookup("s-maxage=")
            .or_else(|| lookup("max-age="))
            .map(Duration::from_secs)
    }

    /// A present but past or malformed `Expires` means already stale.
    fn expires(response: &ResponseData) -> Option<Duration> {
        let value = response.headers().get(EXPIRES)?;
        let fresh_for = value
            .to_str()
            .ok()
            .and_then(|value| parse_http_date(value).ok())
            .and_then(|at| (at - Utc::now()).to_std().ok());
        Some(fresh_for.unwrap_or(Duration::ZERO))
    }
}

impl CachePolicy for DefaultCachePolicy {
    fn is_cacheable_request(&self, config: &RequestConfig) -> bool {
        config.is_get_like() && config.cache.as_ref().is_none_or(|c| c.enabled)
    }

    fn is_cacheable_response(&self, response: &ResponseData) -> bool {
        if !response.status().is_success() || response.status() == StatusCode::PARTIAL_CONTENT {
            return false;
        }

        let directives = Self::directives(response);
        let forbidden = directives
            .iter()
            .any(|d| d == "no-store" || d == "no-cache" || d == "private");
        if forbidden {
            tracing::debug!(
                target: "reqflow::cache",
                directives = ?directives,
                "Response marked as not cacheable by Cache-Control header"
            );
            return false;
        }

        if Self::max_age(&directives) == Some(Duration::ZERO) {
            return false;
        }

        let pragma_no_cache = response
            .headers()
            .get(PRAGMA)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("no-cache"));
        !pragma_no_cache
    }

    fn ttl(&self, config: &RequestConfig, response: &ResponseData, default: Duration) -> Duration {
        if let Some(ttl) = config.cache.as_ref().and_then(|c| c.ttl) {
            return ttl;
        }
        Self::max_age(&Self::directives(response))
            .or_else(|| Self::expires(response))
            .map_or(default, |ttl| ttl.min(MAX_HEADER_TTL))
    }
}

/// Victim selection when the entry or memory bound is exceeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently accessed
    #[default]
    Lru,
    /// Least frequently accessed, oldest access breaking ties
    Lfu,
    /// Soonest to expire
    Ttl,
    /// Expired first, then lowest hits-per-idle-second weighted by size
    Smart,
}

impl EvictionStrategy {
    /// Pick the key to evict among `candidates`.
    pub fn select_victim<'a, I>(self, candidates: I, now: Instant) -> Option<String>
    where
        I: IntoIterator<Item = (&'a str, &'a CacheItem)>,
    {
        let candidates = candidates.into_iter();
        let victim = match self {
            Self::Lru => candidates.min_by_key(|(_, item)| item.last_accessed),
            Self::Lfu => candidates.min_by_key(|(_, item)| (item.access_count, item.last_accessed)),
            Self::Ttl => candidates.min_by_key(|(_, item)| item.remaining_ttl(now)),
            Self::Smart => candidates.min_by(|(_, a), (_, b)| {
                Self::smart_score(a, now).total_cmp(&Self::smart_score(b, now))
            }),
        };
        victim.map(|(key, _)| key.to_string())
    }

    /// Lower scores are evicted first; expired entries score below everything.
    #[allow(clippy::cast_precision_loss)]
    fn smart_score(item: &CacheItem, now: Instant) -> f64 {
        if item.is_expired_at(now) {
            return f64::NEG_INFINITY;
        }
        let idle = now.saturating_duration_since(item.last_accessed).as_secs_f64() + 1.0;
        let size_kib = (item.size as f64 / 1024.0).max(1.0);
        (item.access_count as f64 + 1.0) / idle / size_kib.sqrt()
    }
}
