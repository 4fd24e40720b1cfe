//! Bound enforcement and expired entry cleanup

use std::sync::atomic::Ordering;

use tokio::time::Instant;

use super::super::cache_entry::CacheItem;
use super::core::CacheManager;

impl CacheManager {
    /// Evict until an entry of `incoming_size` bytes fits under `incoming_key`.
    ///
    /// Expired entries go first; after that the configured strategy picks
    /// each victim. Returns the number of entries removed.
    pub(super) fn make_room(&self, incoming_key: &str, incoming_size: u64) -> usize {
        let fits = |count: usize, bytes: u64| {
            count < self.config.max_entries
                && bytes.saturating_add(incoming_size) <= self.config.max_memory_bytes
        };

        let (mut count, mut bytes) = (0usize, 0u64);
        self.store.for_each(&mut |key, item| {
            if key != incoming_key {
                count += 1;
                bytes = bytes.saturating_add(item.size);
            }
        });
        if fits(count, bytes) {
            return 0;
        }

        let mut resident: Vec<(String, CacheItem)> = Vec::with_capacity(count);
        self.store.for_each(&mut |key, item| {
            if key != incoming_key {
                resident.push((key.to_string(), item.clone()));
            }
        });
        bytes = resident.iter().map(|(_, item)| item.size).sum();

        let now = Instant::now();
        let mut evicted = 0;

        resident.retain(|(key, item)| {
            if item.is_expired_at(now) && self.store.remove(key).is_some() {
                bytes = bytes.saturating_sub(item.size);
                self.stats.record_expiration();
                evicted += 1;
                return false;
            }
            true
        });

        while !fits(resident.len(), bytes) {
            let Some(victim) = self
                .config
                .strategy
                .select_victim(resident.iter().map(|(k, v)| (k.as_str(), v)), now)
            else {
                break;
            };

            let Some(index) = resident.iter().position(|(key, _)| *key == victim) else {
                break;
            };
            let (key, item) = resident.swap_remove(index);
            if self.store.remove(&key).is_some() {
                bytes = bytes.saturating_sub(item.size);
                self.stats.record_eviction();
                evicted += 1;
            }
        }

        evicted
    }

    /// Remove every expired entry; returns how many were removed.
    ///
    /// Concurrent calls collapse into one pass.
    pub fn cleanup_expired(&self) -> usize {
        if self
            .cleanup_running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return 0;
        }

        let now = Instant::now();
        let mut expired_keys = Vec::new();
        self.store.for_each(&mut |key, item| {
            if item.is_expired_at(now) {
                expired_keys.push(key.to_string());
            }
        });

        let removed = expired_keys
            .iter()
            .filter(|key| self.store.remove(key).is_some())
            .count();
        for _ in 0..removed {
            self.stats.record_expiration();
        }

        self.cleanup_running.store(false, Ordering::Release);

        if removed > 0 {
            tracing::debug!(target: "reqflow::cache", removed, "Expired cache entries cleaned up");
        }
        removed
    }
}
