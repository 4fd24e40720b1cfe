use http::StatusCode;

use super::types::{Error, Kind};

impl Error {
    /// Returns true if no response reached the client.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(self.inner.kind, Kind::Network)
    }

    /// Returns true if the request deadline was exceeded.
    #[must_use]
    pub fn is_timeout_error(&self) -> bool {
        matches!(self.inner.kind, Kind::Timeout)
    }

    /// Returns true if the request was canceled explicitly or by a derived signal.
    #[must_use]
    pub fn is_cancel_error(&self) -> bool {
        matches!(self.inner.kind, Kind::Cancel)
    }

    /// Returns true if the server answered with an error status.
    #[must_use]
    pub fn is_status(&self) -> bool {
        matches!(self.inner.kind, Kind::Status(_))
    }

    /// Returns true for 4xx responses.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_client_error())
    }

    /// Returns true for 5xx responses.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s.is_server_error())
    }

    #[must_use]
    pub fn is_queue_full(&self) -> bool {
        matches!(self.inner.kind, Kind::QueueFull)
    }

    #[must_use]
    pub fn is_queue_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::QueueTimeout)
    }

    #[must_use]
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    #[must_use]
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode)
    }

    /// Returns true if the failure happened before any response arrived.
    ///
    /// Network and timeout failures carry no response object.
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.inner.response.is_some() || self.is_status()
    }

    /// Returns the status code, if the error was generated from a response.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self.inner.kind {
            Kind::Status(code) => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_primary_flag() {
        let errors = [
            Error::new(Kind::Network),
            Error::new(Kind::Timeout),
            Error::new(Kind::Cancel),
            Error::new(Kind::Status(StatusCode::BAD_GATEWAY)),
        ];

        for err in &errors {
            let flags = [
                err.is_network_error(),
                err.is_timeout_error(),
                err.is_cancel_error(),
                err.status().is_some(),
            ];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{err:?}");
        }
    }

    #[test]
    fn status_subclassification() {
        let client = Error::new(Kind::Status(StatusCode::NOT_FOUND));
        assert!(client.is_client_error());
        assert!(!client.is_server_error());

        let server = Error::new(Kind::Status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(server.is_server_error());
        assert!(server.has_response());
    }
}
