//! Header management
//!
//! Methods for setting custom and common headers such as `Accept` and
//! `User-Agent`.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::builder::core::{ContentType, RequestBuilder};

/// Value accepted by [`RequestBuilder::accept`]: a raw media type or a [`ContentType`].
pub enum AcceptValue {
    String(String),
    ContentType(ContentType),
}

impl AcceptValue {
    pub fn as_str(&self) -> &str {
        match self {
            AcceptValue::String(s) => s,
            AcceptValue::ContentType(ct) => ct.as_str(),
        }
    }
}

impl From<&str> for AcceptValue {
    fn from(s: &str) -> Self {
        AcceptValue::String(s.to_string())
    }
}

impl From<String> for AcceptValue {
    fn from(s: String) -> Self {
        AcceptValue::String(s)
    }
}

impl From<ContentType> for AcceptValue {
    fn from(ct: ContentType) -> Self {
        AcceptValue::ContentType(ct)
    }
}

/// Header constants for common HTTP headers
pub mod header {
    pub use http::header::*;

    /// API key header used by [`api_key`](crate::RequestBuilder::api_key)
    pub const X_API_KEY: &str = "x-api-key";
}

impl<S> RequestBuilder<S> {
    /// Set a header, replacing any earlier value for the same name.
    #[must_use]
    pub fn header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.config = self.config.header(key, value);
        self
    }

    /// Set several headers at once.
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set a header from strings; an invalid name or value fails the request when sent.
    #[must_use]
    pub fn header_str(mut self, key: &str, value: &str) -> Self {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.header(name, value),
            _ => {
                self.error.get_or_insert_with(|| format!("invalid header '{key}'"));
                self
            }
        }
    }

    #[must_use]
    pub fn accept<T: Into<AcceptValue>>(self, accept: T) -> Self {
        let accept = accept.into();
        let value = accept.as_str().to_string();
        self.header_str(header::ACCEPT.as_str(), &value)
    }

    #[must_use]
    pub fn user_agent(self, user_agent: &str) -> Self {
        self.header_str(header::USER_AGENT.as_str(), user_agent)
    }
}
