//! Core CacheManager structure and initialization

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::super::{
    cache_config::CacheConfig,
    cache_stats::{CacheStats, CacheStatsSnapshot},
    policy::{CachePolicy, DefaultCachePolicy},
    store::{CacheStore, FileStore, MemoryStore},
};

/// Response cache over a pluggable [`CacheStore`].
pub struct CacheManager {
    pub(super) store: Arc<dyn CacheStore>,
    pub(super) policy: Arc<dyn CachePolicy>,
    pub(super) config: CacheConfig,
    pub(super) stats: CacheStats,
    /// Cleanup task running flag
    pub(super) cleanup_running: AtomicBool,
}

impl CacheManager {
    /// Build the store `config` asks for.
    ///
    /// A persistent directory that cannot be opened degrades to the memory
    /// store with a warning.
    pub fn new(config: CacheConfig) -> Self {
        let store: Arc<dyn CacheStore> = match &config.persist_dir {
            Some(dir) => match FileStore::open(dir, config.namespace.clone()) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(
                        target: "reqflow::cache",
                        dir = %dir.display(),
                        error = %e,
                        "Cannot open persistent cache, falling back to memory"
                    );
                    Arc::new(MemoryStore::new())
                }
            },
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            policy: Arc::new(DefaultCachePolicy),
            config,
            stats: CacheStats::new(),
            cleanup_running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn CachePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn policy(&self) -> &dyn CachePolicy {
        self.policy.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats
            .snapshot(self.store.len() as u64, self.store.total_size())
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.store.name())
            .field("entries", &self.store.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
