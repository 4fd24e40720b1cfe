use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigResult, ConfigurationError, Validator};

/// Connection pool limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Ceiling on live connections (active, idle and being created)
    pub max_connections: usize,
    pub max_connections_per_host: usize,
    /// Ceiling on idle connections across all hosts
    pub max_idle: usize,
    /// Idle connections unused for longer are closed
    #[serde(with = "crate::config::serde_millis")]
    pub idle_timeout: Duration,
    /// Connections older than this are closed instead of reused
    #[serde(with = "crate::config::serde_millis")]
    pub max_connection_age: Duration,
    /// Give up waiting for a slot after this long
    #[serde(with = "crate::config::serde_millis_opt")]
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_connections_per_host: 6,
            max_idle: 32,
            idle_timeout: Duration::from_secs(90),
            max_connection_age: Duration::from_secs(300),
            acquire_timeout: None,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use]
    pub fn with_max_connections_per_host(mut self, max: usize) -> Self {
        self.max_connections_per_host = max;
        self
    }

    #[must_use]
    pub fn with_max_idle(mut self, max: usize) -> Self {
        self.max_idle = max;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_connection_age(mut self, age: Duration) -> Self {
        self.max_connection_age = age;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }
}

impl Validator for PoolConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 || self.max_connections_per_host == 0 {
            return Err(ConfigurationError::InvalidParameter(
                "pool connection limits must be at least 1".to_string(),
            ));
        }
        if self.max_connections_per_host > self.max_connections {
            return Err(ConfigurationError::Conflict(
                "max_connections_per_host cannot exceed max_connections".to_string(),
            ));
        }
        Ok(())
    }
}
