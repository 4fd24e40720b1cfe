//! Cache lookups, stores and invalidation

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;

use super::super::cache_entry::CacheItem;
use super::core::CacheManager;
use crate::http::{RequestConfig, ResponseData};

impl CacheManager {
    /// Fresh response under `key`, marked `from_cache`.
    ///
    /// An expired entry counts as a miss and is purged on the spot.
    pub fn get(&self, key: &str) -> Option<ResponseData> {
        if !self.config.enabled {
            return None;
        }

        let Some(mut item) = self.store.get(key) else {
            self.stats.record_miss();
            return None;
        };

        let now = Instant::now();
        if item.is_expired_at(now) {
            self.store.remove(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            tracing::debug!(target: "reqflow::cache", key = key, "Expired entry purged on lookup");
            return None;
        }

        item.record_hit(now);
        let response = item.response.clone().with_from_cache();

        // Skip the write-back if the entry was replaced or removed meanwhile.
        let still_current = self
            .store
            .get(key)
            .is_some_and(|current| current.timestamp == item.timestamp);
        if still_current {
            self.store.set(key, item);
        }

        self.stats.record_hit();
        Some(response)
    }

    /// Store `response` under `key` for `ttl`.
    ///
    /// Returns false when caching is disabled, `ttl` is zero, or the entry
    /// alone exceeds the memory bound.
    pub fn set(&self, key: &str, response: ResponseData, ttl: Duration) -> bool {
        self.set_with_tags(key, response, ttl, BTreeSet::new())
    }

    pub fn set_with_tags(
        &self,
        key: &str,
        response: ResponseData,
        ttl: Duration,
        tags: BTreeSet<String>,
    ) -> bool {
        if !self.config.enabled || ttl.is_zero() {
            return false;
        }

        let item = CacheItem::new(response, ttl, tags);
        if item.size > self.config.max_memory_bytes {
            tracing::debug!(
                target: "reqflow::cache",
                key = key,
                size = item.size,
                max_memory = self.config.max_memory_bytes,
                "Entry larger than the whole cache, not storing"
            );
            return false;
        }

        let evicted = self.make_room(key, item.size);
        if evicted > 0 {
            tracing::debug!(
                target: "reqflow::cache",
                evicted_count = evicted,
                strategy = ?self.config.strategy,
                "Cache evicted entries to stay within bounds"
            );
        }

        self.store.set(key, item);
        self.stats.record_set();
        true
    }

    /// Cached response for `config`, if the policy allows caching it.
    pub fn lookup(&self, config: &RequestConfig) -> Option<ResponseData> {
        if !self.config.enabled || !self.policy.is_cacheable_request(config) {
            return None;
        }
        let key = self.policy.key(config).ok()?;
        self.get(&key.fingerprint())
    }

    /// Store a transport response for `config` if both are cacheable.
    pub fn store_response(&self, config: &RequestConfig, response: &ResponseData) -> bool {
        if !self.config.enabled
            || !self.policy.is_cacheable_request(config)
            || !self.policy.is_cacheable_response(response)
        {
            return false;
        }

        let Ok(key) = self.policy.key(config) else {
            return false;
        };
        let ttl = self.policy.ttl(config, response, self.config.ttl);
        self.set_with_tags(&key.fingerprint(), response.clone(), ttl, config.tags.clone())
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.get(key).is_some_and(|item| !item.is_expired())
    }

    /// Clear all cached entries
    pub fn clear(&self) {
        let removed = self.store.len() as u64;
        self.store.clear();
        self.stats.record_invalidations(removed);
    }

    /// Remove entries whose key matches `pattern`.
    ///
    /// `*` matches any run of characters; a pattern without `*` matches any
    /// key containing it.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let doomed: Vec<String> = self
            .store
            .keys()
            .into_iter()
            .filter(|key| matches_pattern(pattern, key))
            .collect();
        self.remove_all(doomed)
    }

    /// Remove entries carrying any of `tags`.
    pub fn invalidate_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        let mut doomed = Vec::new();
        self.store.for_each(&mut |key, item| {
            if item.tags.iter().any(|tag| tags.contains(tag)) {
                doomed.push(key.to_string());
            }
        });
        self.remove_all(doomed)
    }

    fn remove_all(&self, keys: Vec<String>) -> usize {
        let removed = keys
            .iter()
            .filter(|key| self.store.remove(key).is_some())
            .count();
        self.stats.record_invalidations(removed as u64);
        removed
    }
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return key.contains(pattern);
    }

    let pattern = pattern.as_bytes();
    let key = key.as_bytes();
    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, k));
            p += 1;
        } else if p < pattern.len() && pattern[p] == key[k] {
            p += 1;
            k += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            k = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}
