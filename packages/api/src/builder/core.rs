//! Core `RequestBuilder` structure and shared settings
//!
//! Holds the request being assembled, the per-call execution options and the
//! body typestate.

use std::fmt;
use std::time::Duration;

use http::{HeaderValue, Method, header::CONTENT_TYPE};
use reqflow_client::error::Error;
use reqflow_client::prelude::{
    CacheOverride, CancelToken, ExecuteOptions, Priority, RequestConfig, RequestExecutor, RetryPolicy,
};

/// Content type enumeration for the fluent API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// application/json
    ApplicationJson,
    /// application/x-www-form-urlencoded
    ApplicationFormUrlEncoded,
    /// application/octet-stream
    ApplicationOctetStream,
    /// text/plain
    TextPlain,
}

impl ContentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::ApplicationJson => "application/json",
            ContentType::ApplicationFormUrlEncoded => "application/x-www-form-urlencoded",
            ContentType::ApplicationOctetStream => "application/octet-stream",
            ContentType::TextPlain => "text/plain",
        }
    }
}

impl From<&str> for ContentType {
    fn from(s: &str) -> Self {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence {
            "application/x-www-form-urlencoded" => ContentType::ApplicationFormUrlEncoded,
            "application/octet-stream" => ContentType::ApplicationOctetStream,
            "text/plain" => ContentType::TextPlain,
            _ => ContentType::ApplicationJson,
        }
    }
}

/// State marker: no body set yet
#[derive(Debug, Clone, Copy)]
pub struct BodyNotSet;

/// State marker: body set, only body-carrying terminals remain
#[derive(Debug, Clone, Copy)]
pub struct BodySet;

/// Fluent request builder.
///
/// `S` tracks the body state:
/// - `BodyNotSet`: body methods and `get`/`delete`/`head`/`options` available
/// - `BodySet`: `post`/`put`/`patch` available
#[derive(Clone)]
pub struct RequestBuilder<S = BodyNotSet> {
    pub(crate) executor: RequestExecutor,
    pub(crate) config: RequestConfig,
    pub(crate) options: ExecuteOptions,
    /// Deferred failure from a fluent step, surfaced by the terminal method
    pub(crate) error: Option<String>,
    pub(crate) state: S,
    pub(crate) debug_enabled: bool,
}

impl RequestBuilder<BodyNotSet> {
    /// Start a request on a shared executor.
    #[must_use]
    pub fn new(executor: &RequestExecutor) -> Self {
        Self {
            executor: executor.clone(),
            config: RequestConfig::new(Method::GET, ""),
            options: ExecuteOptions::default(),
            error: None,
            state: BodyNotSet,
            debug_enabled: false,
        }
    }

    /// Builder with `Content-Type: application/json`.
    #[must_use]
    pub fn json(executor: &RequestExecutor) -> Self {
        Self::new(executor).content_type(ContentType::ApplicationJson)
    }

    /// Builder with `Content-Type: application/x-www-form-urlencoded`.
    #[must_use]
    pub fn form_urlencoded(executor: &RequestExecutor) -> Self {
        Self::new(executor).content_type(ContentType::ApplicationFormUrlEncoded)
    }
}

impl<S> RequestBuilder<S> {
    /// Log request details at debug level when the request is sent.
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.debug_enabled = true;
        self
    }

    /// Base URL that relative terminal URLs are resolved against.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn content_type(self, content_type: ContentType) -> Self {
        self.header(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()))
    }

    /// Query parameter appended to the URL.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.config = self.config.param(key, value);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn timeout_seconds(self, seconds: u64) -> Self {
        self.timeout(Duration::from_secs(seconds))
    }

    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = Some(policy);
        self
    }

    /// Retry up to `attempts` times with the default backoff; 0 disables retries.
    #[must_use]
    pub fn retry_attempts(self, attempts: u32) -> Self {
        let policy = self.config.retry.clone().unwrap_or_default().with_retries(attempts);
        self.retry(policy)
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = Some(priority);
        self
    }

    /// Tag used for `cancel_by_tags`.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.config.tags.insert(tag.into());
        self
    }

    /// Id used for `cancel(id)` on the executor.
    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.options.request_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config.cancel_token = Some(token);
        self
    }

    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.options.queue_timeout = Some(timeout);
        self
    }

    /// Neither read from nor write to the response cache.
    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.config.cache = Some(CacheOverride::disabled());
        self
    }

    /// Cache the response for `ttl` instead of the server-derived lifetime.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache = Some(CacheOverride::ttl(ttl));
        self
    }

    /// Bypass cache lookup for this call only; a fresh response is still stored.
    #[must_use]
    pub fn skip_cache(mut self) -> Self {
        self.options.skip_cache = true;
        self
    }

    #[must_use]
    pub fn dedupe(mut self, dedupe: bool) -> Self {
        self.config.dedupe = Some(dedupe);
        self
    }

    pub(crate) fn with_state<T>(self, state: T) -> RequestBuilder<T> {
        RequestBuilder {
            executor: self.executor,
            config: self.config,
            options: self.options,
            error: self.error,
            state,
            debug_enabled: self.debug_enabled,
        }
    }

    /// Set method and URL and hand the request to the executor.
    pub(crate) async fn dispatch(
        self,
        method: Method,
        url: &str,
    ) -> Result<reqflow_client::prelude::ResponseData, Error> {
        if let Some(message) = self.error {
            return Err(reqflow_client::error::builder(message));
        }

        let mut config = self.config;
        config.method = method;
        config.url = url.to_string();

        if self.debug_enabled {
            tracing::debug!(
                target: "reqflow::builder",
                method = %config.method,
                url = %config.url,
                body_bytes = config.body.as_ref().map_or(0, |b| b.len()),
                "sending request"
            );
        }

        self.executor.execute(config, self.options).await
    }
}

impl<S: fmt::Debug> fmt::Debug for RequestBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.config.method)
            .field("headers", &self.config.headers)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("debug_enabled", &self.debug_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_ignores_parameters() {
        assert_eq!(
            ContentType::from("application/x-www-form-urlencoded; charset=utf-8"),
            ContentType::ApplicationFormUrlEncoded
        );
        assert_eq!(ContentType::from("application/vnd.api+json"), ContentType::ApplicationJson);
    }
}
