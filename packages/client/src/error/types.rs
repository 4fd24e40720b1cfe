use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use crate::http::{RequestConfig, ResponseData};

/// A Result alias where the Err case is the pipeline `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failed request anywhere in the execution pipeline.
///
/// Cloning is cheap: the source is shared, so every deduplicated caller
/// observes the same error chain.
#[derive(Clone)]
pub struct Error {
    pub inner: Box<Inner>,
}

#[derive(Clone)]
pub struct Inner {
    pub kind: Kind,
    pub source: Option<Arc<dyn StdError + Send + Sync>>,
    pub url: Option<url::Url>,
    pub config: Option<Arc<RequestConfig>>,
    pub response: Option<Arc<ResponseData>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Invalid request configuration (unresolvable URL, bad header)
    Builder,
    /// No response reached the client
    Network,
    /// Deadline exceeded before completion
    Timeout,
    /// Explicit or derived abort
    Cancel,
    /// Response received with status >= 400
    Status(StatusCode),
    /// Scheduler refused the item because the queue is at capacity
    QueueFull,
    /// Item was not admitted to a running slot within its window
    QueueTimeout,
    /// Response body could not be decoded
    Decode,
    /// An interceptor rejected the request or response
    Interceptor,
}

impl Error {
    pub fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                source: None,
                url: None,
                config: None,
                response: None,
            }),
        }
    }

    #[must_use = "Error builder methods return a new Error and should be used"]
    pub fn with<E: Into<Box<dyn StdError + Send + Sync>>>(mut self, source: E) -> Error {
        self.inner.source = Some(Arc::from(source.into()));
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: url::Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    /// Attach the originating request configuration.
    #[must_use]
    pub fn with_config(mut self, config: RequestConfig) -> Self {
        if self.inner.url.is_none() {
            self.inner.url = config.resolved_url().ok();
        }
        self.inner.config = Some(Arc::new(config));
        self
    }

    /// Attach the response the server answered with.
    #[must_use]
    pub fn with_response(mut self, response: ResponseData) -> Self {
        self.inner.response = Some(Arc::new(response));
        self
    }

    #[must_use]
    pub fn kind(&self) -> &Kind {
        &self.inner.kind
    }

    /// Get the URL associated with this error, if any
    #[must_use]
    pub fn url(&self) -> Option<&url::Url> {
        self.inner.url.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> Option<&RequestConfig> {
        self.inner.config.as_deref()
    }

    #[must_use]
    pub fn response(&self) -> Option<&ResponseData> {
        self.inner.response.as_deref()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("reqflow::Error");

        f.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }

        if let Some(ref url) = self.inner.url {
            f.field("url", &url.as_str());
        }

        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Network => f.write_str("network error")?,
            Kind::Timeout => f.write_str("request timeout")?,
            Kind::Cancel => f.write_str("request canceled")?,
            Kind::QueueFull => f.write_str("request queue full")?,
            Kind::QueueTimeout => f.write_str("queue timeout")?,
            Kind::Decode => f.write_str("error decoding response body")?,
            Kind::Interceptor => f.write_str("interceptor error")?,
            Kind::Status(code) => {
                let prefix = if code.is_client_error() {
                    "HTTP status client error"
                } else {
                    "HTTP status server error"
                };
                write!(f, "{prefix} ({code})")?;
            }
        }

        if let Some(ref url) = self.inner.url {
            write!(f, " for url ({url})")?;
        }

        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}
