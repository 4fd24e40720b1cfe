//! Priority scheduling and admission control
//!
//! Requests wait here until a running slot frees up. Admission order is
//! (effective priority, enqueue sequence); long-waiting items are boosted one
//! tier per `boost_interval` so low-priority work cannot starve.

pub mod priority;
pub mod scheduler;

pub use priority::Priority;
pub use scheduler::{EnqueueOptions, PriorityQueue, QueueConfig, QueueStatus};
