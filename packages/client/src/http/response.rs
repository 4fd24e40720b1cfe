//! Response value returned by transports and the cache

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Extensions, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use super::request::RequestConfig;
use crate::error::{self, Error};

/// Response handed back to callers.
///
/// The pipeline moves `ResponseData<Bytes>`; [`ResponseData::json`] and
/// [`ResponseData::text`] decode the payload into a typed value. Fields are
/// read through accessors and every adjustment returns a new value.
#[derive(Debug, Clone)]
pub struct ResponseData<T = Bytes> {
    data: T,
    status: StatusCode,
    status_text: String,
    headers: HeaderMap,
    config: Option<Arc<RequestConfig>>,
    extensions: Extensions,
    duration: Option<Duration>,
    from_cache: bool,
}

impl ResponseData<Bytes> {
    pub fn new(status: StatusCode, headers: HeaderMap, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            config: None,
            extensions: Extensions::new(),
            duration: None,
            from_cache: false,
        }
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(self) -> Result<ResponseData<T>, Error> {
        let value = serde_json::from_slice(&self.data).map_err(error::decode)?;
        Ok(self.map(|_| value))
    }

    /// Decode the payload as UTF-8 text.
    pub fn text(self) -> Result<ResponseData<String>, Error> {
        let text = String::from_utf8(self.data.to_vec()).map_err(error::decode)?;
        Ok(self.map(|_| text))
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl<T> ResponseData<T> {
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The normalized request this response answers.
    #[must_use]
    pub fn config(&self) -> Option<&RequestConfig> {
        self.config.as_deref()
    }

    /// Transport-specific values attached by the adapter.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    #[must_use]
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn with_from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ResponseData<U> {
        ResponseData {
            data: f(self.data),
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            config: self.config,
            extensions: self.extensions,
            duration: self.duration,
            from_cache: self.from_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_decoding_keeps_metadata() {
        let response = ResponseData::new(StatusCode::OK, HeaderMap::new(), "{\"id\":7}")
            .with_from_cache();

        let decoded: ResponseData<serde_json::Value> = response.json().expect("valid json");
        assert_eq!(decoded.data()["id"], 7);
        assert!(decoded.from_cache());
        assert_eq!(decoded.status_text(), "OK");
    }

    #[test]
    fn invalid_json_is_decode_error() {
        let response = ResponseData::new(StatusCode::OK, HeaderMap::new(), "not json");
        let err = response.json::<serde_json::Value>().expect_err("invalid json");
        assert!(err.is_decode());
    }
}
