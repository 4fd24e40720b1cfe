//! Cooperative cancellation
//!
//! - `token`: `CancelToken`, a shareable flag with listeners and any-of composition
//! - `manager`: `CancellationManager`, the request id registry used for
//!   individual, tag-based, bulk and timeout-based cancellation

pub mod manager;
pub mod token;

pub use manager::{CancellationManager, RequestMetadata};
pub use token::CancelToken;
