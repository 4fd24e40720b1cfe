//! # reqflow client
//!
//! Request execution pipeline for HTTP clients. Every request passes through
//! the same ordered stages:
//!
//! - **Response cache** keyed by method, normalized URL and body hash, with
//!   TTL expiry and LRU/LFU/TTL/smart eviction over pluggable stores
//! - **Deduplication** so concurrent identical requests share one execution
//! - **Priority scheduling** with bounded concurrency, queue limits,
//!   admission timeouts and starvation boosting
//! - **Connection pooling** with per-host and global caps and FIFO waiters
//! - **Interceptors** for requests, responses and errors
//! - **Retry** with fixed, linear or exponential backoff and jitter
//! - **Cancellation** by request id, by tag or all at once
//!
//! The network itself sits behind the [`TransportAdapter`] trait; the
//! built-in [`HyperAdapter`] speaks plain HTTP/1.1.
//!
//! ## Usage
//!
//! ```no_run
//! use reqflow_client::prelude::*;
//!
//! # async fn run() -> Result<(), Error> {
//! let client = RequestExecutor::new(
//!     ClientConfig::new().with_base_url("http://localhost:8080/api"),
//! )?;
//!
//! let response = client
//!     .execute(
//!         RequestConfig::get("/users").param("page", 1),
//!         ExecuteOptions::new().priority(Priority::High),
//!     )
//!     .await?;
//! println!("{} ({} bytes)", response.status(), response.size());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod transport;

pub mod prelude;

pub use crate::prelude::*;
