//! Top-level client configuration

use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::validation::{ConfigResult, ConfigValidator, ConfigurationError, Validator};
use crate::cache::CacheConfig;
use crate::pool::PoolConfig;
use crate::queue::{Priority, QueueConfig};
use crate::retry::RetryPolicy;

/// Name of the adapter registered by default.
pub const DEFAULT_ADAPTER: &str = "hyper";

/// Everything an executor needs to know at construction time.
///
/// All fields are optional in JSON; missing ones take the defaults below.
///
/// ```
/// use reqflow_client::config::ClientConfig;
///
/// let config = ClientConfig::from_json_str(
///     r#"{ "base_url": "http://localhost:8080", "timeout": 2500, "max_concurrent": 2 }"#,
/// ).unwrap();
/// assert_eq!(config.queue.max_concurrent, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix joined with relative request URLs
    pub base_url: Option<String>,
    /// Per-request deadline when the request sets none
    #[serde(with = "super::serde_millis")]
    pub timeout: Duration,
    /// Sent with every request; per-call headers take precedence
    #[serde(with = "super::serde_headers")]
    pub headers: HeaderMap,
    /// Registered transport adapter to use
    pub adapter: String,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    /// Priority for requests that do not set one
    pub priority: Priority,
    #[serde(flatten)]
    pub queue: QueueConfig,
    pub pool: PoolConfig,
    /// Share in-flight executions between identical requests
    pub dedupe: bool,
    /// Buffered monitor events per subscriber before lagging
    pub monitor_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(10),
            headers: HeaderMap::new(),
            adapter: DEFAULT_ADAPTER.to_string(),
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            priority: Priority::Normal,
            queue: QueueConfig::default(),
            pool: PoolConfig::default(),
            dedupe: true,
            monitor_capacity: 256,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it.
    ///
    /// # Errors
    ///
    /// `ConfigurationError::Parse` for malformed JSON, otherwise whatever
    /// [`Validator::validate`] reports.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = adapter.into();
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Turn response caching off entirely.
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.queue.max_concurrent = max_concurrent;
        self
    }

    #[must_use]
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.queue.max_queue_size = max_queue_size;
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }
}

impl Validator for ClientConfig {
    fn validate(&self) -> ConfigResult<()> {
        ConfigValidator::validate_base_url(self.base_url.as_deref())?;
        ConfigValidator::validate_timeout(self.timeout, "timeout")?;
        ConfigValidator::validate_range(self.queue.max_concurrent, 1, 1024, "max_concurrent")?;

        if self.adapter.is_empty() {
            return Err(ConfigurationError::InvalidParameter(
                "adapter name cannot be empty".to_string(),
            ));
        }

        if self.monitor_capacity == 0 {
            return Err(ConfigurationError::InvalidParameter(
                "monitor_capacity must be at least 1".to_string(),
            ));
        }

        self.retry.validate()?;
        self.cache.validate()?;
        self.pool.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffStrategy;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.retry.retries, 3);
        assert_eq!(config.retry.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.retry.strategy, BackoffStrategy::Exponential);
        assert!(config.dedupe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn json_overrides_nested_sections() {
        let config = ClientConfig::from_json_str(
            r#"{
                "base_url": "http://api.local",
                "headers": { "x-api-key": "secret" },
                "retry": { "retries": 1, "retry_delay": 250, "strategy": "linear" },
                "cache": { "enabled": false },
                "priority": "high",
                "max_queue_size": 10
            }"#,
        )
        .expect("valid document");

        assert_eq!(config.base_url.as_deref(), Some("http://api.local"));
        assert_eq!(config.headers["x-api-key"], "secret");
        assert_eq!(config.retry.retry_delay, Duration::from_millis(250));
        assert_eq!(config.retry.strategy, BackoffStrategy::Linear);
        assert!(!config.cache.enabled);
        assert_eq!(config.priority, Priority::High);
        assert_eq!(config.queue.max_queue_size, 10);
        assert_eq!(config.queue.max_concurrent, QueueConfig::default().max_concurrent);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            ClientConfig::from_json_str("{ not json"),
            Err(ConfigurationError::Parse(_))
        ));
        assert!(matches!(
            ClientConfig::from_json_str(r#"{ "timeout": 0 }"#),
            Err(ConfigurationError::InvalidTimeout(_))
        ));
        assert!(matches!(
            ClientConfig::from_json_str(r#"{ "base_url": "relative/path" }"#),
            Err(ConfigurationError::InvalidUrl(_))
        ));
    }
}
