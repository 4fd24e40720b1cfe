//! Per-host connection bookkeeping
//!
//! [`ConnectionPool`] hands out [`PooledConnection`] guards that bound total,
//! per-host and idle connections. Waiters are granted slots in FIFO order
//! through oneshot channels; dropping a guard returns its connection.

pub mod config;
pub mod connection;
pub mod manager;
pub mod stats;

pub use config::PoolConfig;
pub use connection::{ConnectionFactory, ConnectionInfo, ConnectionState, HostKey, LogicalConnector};
pub use manager::{ConnectionPool, PooledConnection};
pub use stats::PoolStats;
