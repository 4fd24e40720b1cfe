//! Fluent request builder
//!
//! Provides the typestate API for assembling a request and handing it to the
//! execution pipeline.

pub mod auth;
pub mod body;
pub mod core;
pub mod headers;
pub mod methods;

pub use self::core::*;
pub use headers::*;
