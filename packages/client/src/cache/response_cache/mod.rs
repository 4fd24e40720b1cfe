//! Cache manager
//!
//! - `core`: `CacheManager` struct, construction and accessors
//! - `operations`: lookup, store, delete and invalidation
//! - `eviction`: bound enforcement and expired entry cleanup

pub mod core;
pub mod eviction;
pub mod operations;

pub use self::core::CacheManager;
