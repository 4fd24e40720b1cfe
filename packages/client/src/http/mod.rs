//! Request and response value types
//!
//! `RequestConfig` is the per-call description a caller hands to the executor;
//! `ResponseData` is what comes back, from the transport or from the cache.

pub mod request;
pub mod response;
pub mod url;

pub use request::{CacheOverride, RequestConfig, ResponseType};
pub use response::ResponseData;
