use std::time::Duration;

use http::StatusCode;

use super::BoxError;
use super::helpers::{OperationCanceled, QueueFull, QueueTimedOut, TimedOut};
use super::types::{Error, Kind};

/// Creates an `Error` for an invalid request configuration.
pub fn builder<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Builder).with(e.into())
}

/// Creates an `Error` for a failure where no response reached the client.
pub fn network<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Network).with(e.into())
}

/// Creates an `Error` for an elapsed request deadline.
pub fn timeout(after: Duration) -> Error {
    Error::new(Kind::Timeout).with(TimedOut(after))
}

/// Creates an `Error` for an aborted request.
pub fn canceled(reason: impl Into<String>) -> Error {
    Error::new(Kind::Cancel).with(OperationCanceled {
        reason: reason.into(),
    })
}

/// Creates an `Error` for an error status answered by the server.
pub fn status_code(status: StatusCode) -> Error {
    Error::new(Kind::Status(status))
}

pub fn queue_full(capacity: usize) -> Error {
    Error::new(Kind::QueueFull).with(QueueFull { capacity })
}

pub fn queue_timeout(after: Duration) -> Error {
    Error::new(Kind::QueueTimeout).with(QueueTimedOut(after))
}

/// Creates an `Error` for a decode error.
pub fn decode<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Decode).with(e.into())
}

pub fn interceptor<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Interceptor).with(e.into())
}
