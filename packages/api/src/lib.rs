//! reqflow public API
//!
//! A fluent, typestate request builder over the
//! [`RequestExecutor`](reqflow_client::RequestExecutor) pipeline. Body methods
//! are only available before a body is set, and `post`/`put`/`patch` only
//! after.
//!
//! ```no_run
//! use reqflow::{ClientConfig, Priority, RequestBuilder, RequestExecutor};
//!
//! # async fn run() -> Result<(), reqflow::HttpError> {
//! let client = RequestExecutor::new(ClientConfig::new().with_base_url("http://localhost:8080"))?;
//!
//! let created = RequestBuilder::json(&client)
//!     .priority(Priority::High)
//!     .bearer_auth("token")
//!     .body(&serde_json::json!({"name": "widget"}))
//!     .post("/widgets")
//!     .await?;
//! assert!(created.status().is_success());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod builder;

pub use builder::{AcceptValue, BodyNotSet, BodySet, ContentType, RequestBuilder, header};

pub use reqflow_client::prelude::{
    CacheConfig, CacheOverride, CancelToken, ClientConfig, ClientStatsSnapshot, Error, ExecuteOptions,
    HttpError, MonitorEvent, Priority, RequestConfig, RequestExecutor, ResponseData, RetryPolicy,
};
pub use reqflow_client::{cache, cancel, client, config, error, interceptor, pool, queue, retry, transport};

/// Builder for a request sent through `executor`.
///
/// Shorthand for [`RequestBuilder::new`].
#[must_use]
pub fn request(executor: &RequestExecutor) -> RequestBuilder {
    RequestBuilder::new(executor)
}

/// JSON builder for `executor`.
#[must_use]
pub fn json(executor: &RequestExecutor) -> RequestBuilder {
    RequestBuilder::json(executor)
}

/// Form-urlencoded builder for `executor`.
#[must_use]
pub fn form(executor: &RequestExecutor) -> RequestBuilder {
    RequestBuilder::form_urlencoded(executor)
}
