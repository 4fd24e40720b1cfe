//! Request body handling
//!
//! Setting a body moves the builder into the `BodySet` state. Serialized
//! bodies follow the Content-Type already chosen on the builder.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use serde::Serialize;

use crate::builder::core::{BodyNotSet, BodySet, ContentType, RequestBuilder};

impl RequestBuilder<BodyNotSet> {
    /// Serialize `body` as JSON, or as a form when the Content-Type says so.
    ///
    /// A serialization failure is reported when the request is sent.
    #[must_use]
    pub fn body<T: Serialize + ?Sized>(mut self, body: &T) -> RequestBuilder<BodySet> {
        let content_type = self
            .config
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(ContentType::ApplicationJson, ContentType::from);

        let encoded = match content_type {
            ContentType::ApplicationFormUrlEncoded => serde_urlencoded::to_string(body)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
            _ => serde_json::to_vec(body).map_err(|e| e.to_string()),
        };

        match encoded {
            Ok(bytes) => {
                if self.debug_enabled {
                    tracing::debug!(
                        target: "reqflow::builder",
                        bytes = bytes.len(),
                        content_type = content_type.as_str(),
                        "request body set"
                    );
                }
                self.config.body = Some(Bytes::from(bytes));
            }
            Err(message) => {
                self.error.get_or_insert(format!("failed to serialize request body: {message}"));
            }
        }
        self.with_state(BodySet)
    }

    /// Raw bytes, sent as-is.
    #[must_use]
    pub fn raw_body(mut self, bytes: impl Into<Bytes>) -> RequestBuilder<BodySet> {
        self.config.body = Some(bytes.into());
        self.with_state(BodySet)
    }

    /// Plain text body; sets `Content-Type: text/plain`.
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> RequestBuilder<BodySet> {
        self.content_type(ContentType::TextPlain)
            .raw_body(text.into())
    }
}
