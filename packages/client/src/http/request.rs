//! Per-call request configuration

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use ::url::Url;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::error::{self, Error};
use crate::queue::Priority;
use crate::retry::RetryPolicy;

/// How the caller intends to consume the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Json,
    Text,
    Bytes,
}

impl ResponseType {
    /// Accept header sent when the caller did not set one
    #[must_use]
    pub fn accept(self) -> &'static str {
        match self {
            ResponseType::Json => "application/json, text/plain, */*",
            ResponseType::Text => "text/plain, */*",
            ResponseType::Bytes => "*/*",
        }
    }
}

/// Per-request cache override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOverride {
    pub enabled: bool,
    pub ttl: Option<Duration>,
}

impl CacheOverride {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ttl: None,
        }
    }

    #[must_use]
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl: Some(ttl),
        }
    }
}

/// Logical description of one request.
///
/// Values are cheap to clone (`Bytes` body, shared cancel token) and are
/// treated as immutable once handed to the executor; normalization produces a
/// new value rather than editing the caller's.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    pub url: String,
    pub base_url: Option<String>,
    pub headers: HeaderMap,
    pub params: BTreeMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
    pub response_type: ResponseType,
    pub with_credentials: bool,
    pub cancel_token: Option<CancelToken>,
    pub priority: Option<Priority>,
    pub retry: Option<RetryPolicy>,
    pub cache: Option<CacheOverride>,
    pub tags: BTreeSet<String>,
    pub dedupe: Option<bool>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

impl RequestConfig {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            base_url: None,
            headers: HeaderMap::new(),
            params: BTreeMap::new(),
            body: None,
            timeout: None,
            response_type: ResponseType::default(),
            with_credentials: false,
            cancel_token: None,
            priority: None,
            retry: None,
            cache: None,
            tags: BTreeSet::new(),
            dedupe: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value).map_err(error::builder)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: CacheOverride) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    #[must_use]
    pub fn dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = Some(dedupe);
        self
    }

    /// Absolute URL this request targets, including `params`.
    pub fn resolved_url(&self) -> Result<Url, Error> {
        super::url::resolve(self.base_url.as_deref(), &self.url, &self.params)
    }

    /// GET and HEAD are the only methods whose responses are cached.
    #[must_use]
    pub fn is_get_like(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Fill unset fields from client-wide defaults.
    ///
    /// Per-call headers take precedence over `default_headers`; the URL is
    /// resolved and frozen into `url` so later stages see an absolute URI.
    pub(crate) fn normalized(
        mut self,
        base_url: Option<&str>,
        default_headers: &HeaderMap,
        default_timeout: Duration,
    ) -> Result<Self, Error> {
        if self.base_url.is_none() {
            self.base_url = base_url.map(str::to_string);
        }

        let resolved = self.resolved_url()?;
        self.url = resolved.to_string();
        self.base_url = None;
        self.params.clear();

        let mut headers = default_headers.clone();
        for name in self.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(self.response_type.accept()));
        }
        self.headers = headers;

        if self.timeout.is_none() {
            self.timeout = Some(default_timeout);
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use http::header::AUTHORIZATION;

    use super::*;

    #[test]
    fn normalization_merges_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert(AUTHORIZATION, HeaderValue::from_static("Bearer default"));
        defaults.insert(
            HeaderName::from_static("x-client"),
            HeaderValue::from_static("reqflow"),
        );

        let config = RequestConfig::get("/items")
            .param("page", 2)
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer call"))
            .normalized(Some("https://api.example.com/v1"), &defaults, Duration::from_secs(10))
            .expect("normalizes");

        assert_eq!(config.url, "https://api.example.com/v1/items?page=2");
        assert_eq!(config.headers[AUTHORIZATION], "Bearer call");
        assert_eq!(config.headers["x-client"], "reqflow");
        assert!(config.headers.contains_key(ACCEPT));
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
        assert!(config.params.is_empty());
    }

    #[test]
    fn normalization_is_stable() {
        let once = RequestConfig::get("https://h.test/a")
            .param("q", "x")
            .normalized(None, &HeaderMap::new(), Duration::from_secs(1))
            .expect("normalizes");
        let twice = once
            .clone()
            .normalized(None, &HeaderMap::new(), Duration::from_secs(1))
            .expect("normalizes");
        assert_eq!(once.url, twice.url);
    }

    #[test]
    fn json_body_sets_content_type() {
        let config = RequestConfig::post("http://h.test/")
            .json(&serde_json::json!({"a": 1}))
            .expect("serializable");
        assert_eq!(config.headers[CONTENT_TYPE], "application/json");
        assert_eq!(config.body.as_deref(), Some(&b"{\"a\":1}"[..]));
    }
}
