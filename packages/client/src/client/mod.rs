//! Request executor
//!
//! [`RequestExecutor`] owns one instance of every pipeline stage and drives a
//! request through them in a fixed order: normalize, cache lookup, dedup,
//! priority queue, pool slot, interceptors around the retried transport call,
//! then cache store and bookkeeping.

pub mod core;
pub mod monitor;
pub mod options;
pub mod stats;

pub use self::core::RequestExecutor;

pub use monitor::MonitorEvent;
pub use options::ExecuteOptions;
pub use stats::{ClientStats, ClientStatsSnapshot};
