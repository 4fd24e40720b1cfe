//! Retry logic with configurable backoff and jitter
//!
//! Provides the retry policy, the cancellation-aware retry manager, a
//! higher-order `with_retry` wrapper and per-manager statistics.

pub mod executor;
pub mod helpers;
pub mod policy;
pub mod stats;

// Re-export main types for convenient access
pub use executor::RetryManager;
pub use helpers::{execute_with_default_retry, execute_without_retry, with_retry};
pub use policy::{BackoffStrategy, RetryCondition, RetryPolicy};
pub use stats::{RetryStats, RetryStatsSnapshot};
