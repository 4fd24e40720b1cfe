//! Response cache with pluggable storage and eviction
//!
//! - [`CacheManager`] applies TTL, cacheability and eviction on top of a store
//! - [`CacheStore`] is the storage seam: [`MemoryStore`] keeps entries in a
//!   lock-free skiplist, [`FileStore`] persists JSON envelopes to a directory
//! - [`CachePolicy`] decides what is cacheable, for how long, under which key
//! - [`EvictionStrategy`] picks the victim when a bound is exceeded
//!
//! Expired entries are never returned; they are purged on access or by
//! [`CacheManager::cleanup_expired`].

pub mod cache_config;
pub mod cache_entry;
pub mod cache_key;
pub mod cache_stats;
pub mod http_date;
pub mod policy;
pub mod response_cache;
pub mod store;

pub use cache_config::CacheConfig;
pub use cache_entry::CacheItem;
pub use cache_key::CacheKey;
pub use cache_stats::{CacheStats, CacheStatsSnapshot};
pub use http_date::{HttpDateParseError, parse_http_date};
pub use policy::{CachePolicy, DefaultCachePolicy, EvictionStrategy};
pub use response_cache::CacheManager;
pub use store::{CacheStore, FileStore, MemoryStore};
