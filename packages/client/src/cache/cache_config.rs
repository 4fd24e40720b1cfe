//! Cache configuration and preset policies

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::EvictionStrategy;
use crate::config::validation::{ConfigResult, ConfigurationError, Validator};

/// Cache configuration and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// TTL for responses carrying no freshness headers
    #[serde(with = "crate::config::serde_millis")]
    pub ttl: Duration,
    pub strategy: EvictionStrategy,
    /// Maximum number of entries in cache
    pub max_entries: usize,
    /// Maximum memory usage in bytes
    pub max_memory_bytes: u64,
    /// Prefix of persisted keys (`"<namespace>:<key>"`)
    pub namespace: String,
    /// Persist entries under this directory instead of memory only
    pub persist_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            strategy: EvictionStrategy::Lru,
            max_entries: 1000,
            max_memory_bytes: 100 * 1024 * 1024,
            namespace: "reqflow".to_string(),
            persist_dir: None,
        }
    }
}

impl CacheConfig {
    /// Large, long-lived cache
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            strategy: EvictionStrategy::Smart,
            max_entries: 5000,
            max_memory_bytes: 500 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// Small, short-lived cache
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_entries: 200,
            max_memory_bytes: 20 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// Caching disabled
    #[must_use]
    pub fn no_cache() -> Self {
        Self {
            enabled: false,
            ttl: Duration::ZERO,
            max_entries: 0,
            max_memory_bytes: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    #[must_use]
    pub fn with_max_memory_bytes(mut self, max_memory_bytes: u64) -> Self {
        self.max_memory_bytes = max_memory_bytes;
        self
    }

    #[must_use]
    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }
}

impl Validator for CacheConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.max_entries == 0 || self.max_memory_bytes == 0 {
            return Err(ConfigurationError::Conflict(
                "an enabled cache needs non-zero max_entries and max_memory_bytes".to_string(),
            ));
        }
        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(ConfigurationError::InvalidParameter(
                "cache namespace must be non-empty and contain no ':'".to_string(),
            ));
        }
        Ok(())
    }
}
