//! Logical connections and how they are created

use std::fmt;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::error::{self, Error};

/// Pool partition: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl HostKey {
    pub fn from_url(url: &Url) -> Result<Self, Error> {
        let host = url
            .host_str()
            .ok_or_else(|| error::builder(format!("URL has no host: {url}")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| error::builder(format!("URL has no port: {url}")))?;
        Ok(Self {
            protocol: url.scheme().to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Active,
    Closed,
}

/// Bookkeeping record for one logical connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub use_count: u64,
    pub state: ConnectionState,
}

impl ConnectionInfo {
    pub(crate) fn new(id: u64, key: &HostKey) -> Self {
        let now = Instant::now();
        Self {
            id,
            host: key.host.clone(),
            port: key.port,
            protocol: key.protocol.clone(),
            created_at: now,
            last_used_at: now,
            use_count: 0,
            state: ConnectionState::Active,
        }
    }

    #[must_use]
    pub fn key(&self) -> HostKey {
        HostKey {
            protocol: self.protocol.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// Establishes and health-checks connections for the pool.
///
/// `connect` runs outside the pool lock; its failure reaches the caller as a
/// network error and releases the reserved slot.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, key: &HostKey) -> Result<(), Error>;

    /// Checked before an idle connection is reused.
    fn is_alive(&self, _info: &ConnectionInfo) -> bool {
        true
    }
}

/// Factory for pure bookkeeping: connections are created instantly and are
/// always alive. Transports keep their own sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalConnector;

#[async_trait]
impl ConnectionFactory for LogicalConnector {
    async fn connect(&self, _key: &HostKey) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_fills_default_port() {
        let key = HostKey::from_url(&Url::parse("https://api.example.com/v1").expect("url"))
            .expect("has host");
        assert_eq!(key.port, 443);
        assert_eq!(key.to_string(), "https://api.example.com:443");
    }
}
