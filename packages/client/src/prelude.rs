//! Types most callers need.

pub use crate::cache::{CacheConfig, CacheManager, CachePolicy, CacheStore, EvictionStrategy};
pub use crate::cancel::{CancelToken, CancellationManager};
pub use crate::client::{ClientStatsSnapshot, ExecuteOptions, MonitorEvent, RequestExecutor};
pub use crate::config::{ClientConfig, ConfigurationError};
pub use crate::error::{Error, HttpError};
pub use crate::http::{CacheOverride, RequestConfig, ResponseData, ResponseType};
pub use crate::interceptor::{
    ErrorInterceptor, InterceptorId, InterceptorManager, RequestInterceptor, ResponseInterceptor,
};
pub use crate::pool::{ConnectionFactory, PoolConfig};
pub use crate::queue::{Priority, QueueConfig, QueueStatus};
pub use crate::retry::{BackoffStrategy, RetryPolicy};
pub use crate::transport::{AdapterRegistry, FnAdapter, HyperAdapter, TransportAdapter};

pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
pub use url::Url;
