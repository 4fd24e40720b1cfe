//! Authentication headers
//!
//! API key, basic and bearer token helpers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::builder::core::RequestBuilder;
use crate::builder::headers::header;

impl<S> RequestBuilder<S> {
    /// Adds an `X-API-Key` header.
    #[must_use]
    pub fn api_key(self, key: &str) -> Self {
        self.header_str(header::X_API_KEY, key)
    }

    /// Basic authentication with base64-encoded `user:password`.
    #[must_use]
    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        self.header_str(header::AUTHORIZATION.as_str(), &format!("Basic {encoded}"))
    }

    #[must_use]
    pub fn bearer_auth(self, token: &str) -> Self {
        self.header_str(header::AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }
}
