//! In-flight request deduplication
//!
//! Concurrent executions that share a fingerprint share one underlying run.

pub mod manager;

pub use manager::{DedupManager, DedupStats};
