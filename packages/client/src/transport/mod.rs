//! Transport adapters
//!
//! The pipeline never touches sockets itself. A [`TransportAdapter`] turns a
//! normalized [`RequestConfig`](crate::http::RequestConfig) into a
//! [`ResponseData`](crate::http::ResponseData); adapters are looked up by name
//! through an [`AdapterRegistry`].

pub mod adapter;
pub mod func;
pub mod hyper_adapter;
pub mod registry;

pub use adapter::TransportAdapter;
pub use func::FnAdapter;
pub use hyper_adapter::HyperAdapter;
pub use registry::AdapterRegistry;
