//! Request, response and error interceptors
//!
//! Each phase is an ordered list of handler pairs. A value flows through the
//! list in registration order: a success value goes to the next handler's
//! fulfilled side, a failure to its rejected side, so a failing handler
//! short-circuits to the nearest handler able to recover.

pub mod chain;
pub mod handlers;

pub use chain::{InterceptorId, InterceptorManager};
pub use handlers::{
    ErrorInterceptor, RequestInterceptor, ResponseInterceptor, error_fn, request_fn, response_fn,
};
