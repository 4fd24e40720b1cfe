//! Error taxonomy for the request pipeline
//!
//! Every failure surfaced to a caller is an [`Error`] with exactly one primary
//! classification (network, timeout, cancel, status, queue, builder, decode or
//! interceptor) so callers can branch without parsing messages.

pub mod classification;
pub mod constructors;
pub mod helpers;
pub mod types;

pub use constructors::*;
pub use helpers::{OperationCanceled, PoolUnavailable, QueueFull, QueueTimedOut, TimedOut};
pub use types::{Error, Inner, Kind, Result};

// Type alias used throughout the pipeline
pub type HttpError = Error;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
