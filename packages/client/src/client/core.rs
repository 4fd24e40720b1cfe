//! Request execution pipeline

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::monitor::MonitorEvent;
use super::options::ExecuteOptions;
use super::stats::{ClientStats, ClientStatsSnapshot};
use crate::cache::{CacheKey, CacheManager};
use crate::cancel::{CancelToken, CancellationManager};
use crate::config::{ClientConfig, Validator};
use crate::dedup::DedupManager;
use crate::error::{self, Error};
use crate::http::{RequestConfig, ResponseData};
use crate::interceptor::InterceptorManager;
use crate::pool::{ConnectionPool, HostKey};
use crate::queue::{EnqueueOptions, PriorityQueue, QueueStatus};
use crate::retry::{RetryManager, RetryPolicy, RetryStats};
use crate::transport::{AdapterRegistry, TransportAdapter};

/// Settled requests between housekeeping passes over cache and pool.
const HOUSEKEEPING_INTERVAL: u64 = 64;

struct ExecutorInner {
    config: ClientConfig,
    adapter: Arc<dyn TransportAdapter>,
    cache: CacheManager,
    dedup: DedupManager<ResponseData>,
    queue: PriorityQueue,
    pool: ConnectionPool,
    retry_stats: Arc<RetryStats>,
    cancellation: CancellationManager,
    interceptors: InterceptorManager,
    stats: ClientStats,
    monitor: broadcast::Sender<MonitorEvent>,
    next_request: AtomicU64,
}

/// Drives requests through cache, dedup, queue, pool, interceptors and retry.
///
/// Cloning is cheap; clones share every stage. Nothing is global, so each
/// executor is fully isolated from the others.
#[derive(Clone)]
pub struct RequestExecutor {
    inner: Arc<ExecutorInner>,
}

/// Per-execution settings carried into a (possibly shared) run.
#[derive(Clone)]
struct RunPlan {
    request_id: String,
    skip_cache: bool,
    skip_retry: bool,
    priority: Option<crate::queue::Priority>,
    queue_timeout: Option<Duration>,
}

/// Drops the request's cancellation registration when the call settles.
struct Registration<'a> {
    cancellation: &'a CancellationManager,
    id: &'a str,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.cancellation.cleanup(self.id);
    }
}

impl RequestExecutor {
    /// Executor using the adapter named by `config.adapter` from the built-in registry.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::with_registry(config, &AdapterRegistry::with_defaults())
    }

    pub fn with_registry(config: ClientConfig, registry: &AdapterRegistry) -> Result<Self, Error> {
        let adapter = registry.get(&config.adapter)?;
        Self::with_adapter(config, adapter)
    }

    /// Executor sending every request through `adapter`, whatever `config.adapter` names.
    pub fn with_adapter(config: ClientConfig, adapter: Arc<dyn TransportAdapter>) -> Result<Self, Error> {
        config.validate().map_err(error::builder)?;

        let (monitor, _) = broadcast::channel(config.monitor_capacity.max(1));
        tracing::debug!(
            target: "reqflow::client",
            adapter = adapter.name(),
            max_concurrent = config.queue.max_concurrent,
            cache = config.cache.enabled,
            "executor created"
        );

        Ok(Self {
            inner: Arc::new(ExecutorInner {
                cache: CacheManager::new(config.cache.clone()),
                dedup: DedupManager::new(),
                queue: PriorityQueue::new(config.queue.clone()),
                pool: ConnectionPool::new(config.pool.clone()),
                retry_stats: Arc::new(RetryStats::new()),
                cancellation: CancellationManager::new(),
                interceptors: InterceptorManager::new(),
                stats: ClientStats::new(),
                monitor,
                next_request: AtomicU64::new(1),
                adapter,
                config,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn interceptors(&self) -> &InterceptorManager {
        &self.inner.interceptors
    }

    #[must_use]
    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Run `config` through the full pipeline.
    pub async fn execute(&self, config: RequestConfig, options: ExecuteOptions) -> Result<ResponseData, Error> {
        let inner = &self.inner;
        let ExecuteOptions {
            skip_cache,
            skip_retry,
            skip_dedup,
            request_id,
            priority,
            queue_timeout,
            tags,
        } = options;
        let request_id = request_id
            .unwrap_or_else(|| format!("req-{}", inner.next_request.fetch_add(1, Ordering::Relaxed)));

        let config = config.normalized(inner.config.base_url.as_deref(), &inner.config.headers, inner.config.timeout)?;
        let total = inner.stats.record_request();

        if let Some(token) = config.cancel_token.as_ref().filter(|t| t.is_cancelled()) {
            inner.stats.record_cancelled();
            return Err(cancel_error(token));
        }

        if !skip_cache {
            if let Some(hit) = inner.cache.lookup(&config) {
                inner.stats.record_cache_hit();
                inner.stats.record_success(hit.size() as u64, Duration::ZERO);
                tracing::debug!(target: "reqflow::client", request_id = %request_id, url = %config.url, "served from cache");
                self.emit(MonitorEvent::Completed {
                    request_id,
                    status: hit.status(),
                    duration: Duration::ZERO,
                    from_cache: true,
                });
                return Ok(hit);
            }
        }

        let mut all_tags: BTreeSet<String> = config.tags.clone();
        all_tags.extend(tags);
        let token = match inner
            .cancellation
            .register(request_id.clone(), all_tags, config.cancel_token.clone())
        {
            Ok(token) => token,
            Err(err) => {
                inner.stats.record_failure(Duration::ZERO);
                tracing::warn!(target: "reqflow::client", request_id = %request_id, "request id already in flight");
                return Err(err.with_config(config));
            }
        };
        let _registration = Registration {
            cancellation: &inner.cancellation,
            id: &request_id,
        };

        self.emit(MonitorEvent::Started {
            request_id: request_id.clone(),
            method: config.method.clone(),
            url: config.url.clone(),
        });
        let started = Instant::now();

        let plan = RunPlan {
            request_id: request_id.clone(),
            skip_cache,
            skip_retry,
            priority,
            queue_timeout,
        };
        let dedupe = !skip_dedup && config.dedupe.unwrap_or(inner.config.dedupe);

        let result = if dedupe {
            let fingerprint = CacheKey::from_config(&config)?.fingerprint();
            let this = self.clone();
            inner
                .dedup
                .execute(&fingerprint, Some(&token), move |run_token| async move {
                    this.run(config, plan, run_token).await
                })
                .await
        } else {
            self.run(config, plan, token.clone()).await
        };

        let result = match result {
            Ok(response) => Ok(response),
            Err(e) if token.is_cancelled() || e.is_cancel_error() => Err(e),
            Err(e) => inner.interceptors.process_error(e).await,
        };
        let result = if token.is_cancelled() {
            Err(cancel_error(&token))
        } else {
            result
        };

        self.settle(&request_id, &result, started.elapsed());
        if total % HOUSEKEEPING_INTERVAL == 0 {
            self.housekeeping();
        }
        result
    }

    /// One execution shared by every deduplicated caller.
    async fn run(&self, config: RequestConfig, plan: RunPlan, token: CancelToken) -> Result<ResponseData, Error> {
        let inner = &self.inner;
        let priority = plan
            .priority
            .or(config.priority)
            .unwrap_or(inner.config.priority);

        let mut admission = EnqueueOptions::new(plan.request_id.clone(), priority).token(token.clone());
        if let Some(window) = plan.queue_timeout {
            admission = admission.queue_timeout(window);
        }

        let response = inner
            .queue
            .enqueue(admission, self.dispatch(config.clone(), plan.skip_retry, &token))
            .await?;

        if !plan.skip_cache && inner.cache.store_response(&config, &response) {
            tracing::trace!(target: "reqflow::client", url = %config.url, "response cached");
        }
        Ok(response)
    }

    /// Admitted work: pool slot, request chain, retried transport, response chain.
    async fn dispatch(&self, config: RequestConfig, skip_retry: bool, token: &CancelToken) -> Result<ResponseData, Error> {
        let inner = &self.inner;
        let key = HostKey::from_url(&config.resolved_url()?)?;
        let connection = inner.pool.acquire(key, Some(token)).await?;

        let config = inner.interceptors.process_request(config).await?;
        let policy = if skip_retry {
            RetryPolicy::no_retry()
        } else {
            config.retry.clone().unwrap_or_else(|| inner.config.retry.clone())
        };
        let retry = RetryManager::with_stats(policy, Arc::clone(&inner.retry_stats));

        let result = retry
            .execute_with_token(|attempt| self.attempt(&config, token, attempt), Some(token))
            .await;

        match &result {
            Err(e) if !e.has_response() && !e.is_cancel_error() => connection.discard(),
            _ => connection.release(),
        }

        inner.interceptors.process_response(result?).await
    }

    /// A single transport call raced against the timeout and cancellation.
    async fn attempt(&self, config: &RequestConfig, token: &CancelToken, attempt: u32) -> Result<ResponseData, Error> {
        let inner = &self.inner;
        let limit = config.timeout.unwrap_or(inner.config.timeout);
        let deadline = async {
            if limit.is_zero() {
                std::future::pending::<()>().await;
            } else {
                tokio::time::sleep(limit).await;
            }
        };

        if let Some(body) = &config.body {
            inner.stats.record_bytes_sent(body.len() as u64);
        }
        tracing::trace!(
            target: "reqflow::client",
            method = %config.method,
            url = %config.url,
            attempt,
            "transport attempt"
        );

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(cancel_error(token)),
            () = deadline => return Err(error::timeout(limit).with_config(config.clone())),
            response = inner.adapter.request(config, token) => {
                response.map_err(|e| e.with_config(config.clone()))?
            }
        };

        let response = response
            .with_config(config.clone())
            .with_duration(started.elapsed());
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error::status_code(response.status())
                .with_config(config.clone())
                .with_response(response))
        }
    }

    fn settle(&self, request_id: &str, result: &Result<ResponseData, Error>, elapsed: Duration) {
        let inner = &self.inner;
        match result {
            Ok(response) => {
                inner.stats.record_success(response.size() as u64, elapsed);
                tracing::debug!(
                    target: "reqflow::client",
                    request_id,
                    status = response.status().as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request completed"
                );
                self.emit(MonitorEvent::Completed {
                    request_id: request_id.to_string(),
                    status: response.status(),
                    duration: elapsed,
                    from_cache: response.from_cache(),
                });
            }
            Err(e) if e.is_cancel_error() => {
                inner.stats.record_cancelled();
                tracing::debug!(target: "reqflow::client", request_id, error = %e, "request cancelled");
                self.emit(MonitorEvent::Cancelled {
                    request_id: request_id.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                inner.stats.record_failure(elapsed);
                tracing::debug!(target: "reqflow::client", request_id, error = %e, "request failed");
                self.emit(MonitorEvent::Failed {
                    request_id: request_id.to_string(),
                    error: e.to_string(),
                    duration: elapsed,
                });
            }
        }
    }

    fn housekeeping(&self) {
        let expired = self.inner.cache.cleanup_expired();
        let trimmed = self.inner.pool.trim_idle();
        if expired + trimmed > 0 {
            tracing::debug!(target: "reqflow::client", expired, trimmed, "housekeeping");
        }
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine.
        let _ = self.inner.monitor.send(event);
    }

    pub async fn request(&self, method: Method, url: impl Into<String>) -> Result<ResponseData, Error> {
        self.send(RequestConfig::new(method, url)).await
    }

    /// Execute `config` with default options.
    pub async fn send(&self, config: RequestConfig) -> Result<ResponseData, Error> {
        self.execute(config, ExecuteOptions::default()).await
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<ResponseData, Error> {
        self.request(Method::GET, url).await
    }

    pub async fn post(&self, url: impl Into<String>, body: impl Into<Bytes>) -> Result<ResponseData, Error> {
        self.send(RequestConfig::new(Method::POST, url).body(body)).await
    }

    pub async fn put(&self, url: impl Into<String>, body: impl Into<Bytes>) -> Result<ResponseData, Error> {
        self.send(RequestConfig::new(Method::PUT, url).body(body)).await
    }

    pub async fn patch(&self, url: impl Into<String>, body: impl Into<Bytes>) -> Result<ResponseData, Error> {
        self.send(RequestConfig::new(Method::PATCH, url).body(body)).await
    }

    pub async fn delete(&self, url: impl Into<String>) -> Result<ResponseData, Error> {
        self.request(Method::DELETE, url).await
    }

    pub async fn head(&self, url: impl Into<String>) -> Result<ResponseData, Error> {
        self.request(Method::HEAD, url).await
    }

    pub async fn options(&self, url: impl Into<String>) -> Result<ResponseData, Error> {
        self.request(Method::OPTIONS, url).await
    }

    /// Cancel one request by id. `false` if it is unknown or already settled.
    pub fn cancel(&self, request_id: &str) -> bool {
        self.cancel_with_reason(request_id, "cancelled by caller")
    }

    pub fn cancel_with_reason(&self, request_id: &str, reason: &str) -> bool {
        self.inner.cancellation.cancel(request_id, reason)
    }

    pub fn cancel_all(&self, reason: &str) -> usize {
        self.inner.cancellation.cancel_all(reason)
    }

    pub fn cancel_by_tags<I, S>(&self, tags: I, reason: &str) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.cancellation.cancel_by_tags(tags, reason)
    }

    /// Requests started and not yet settled.
    #[must_use]
    pub fn active_request_count(&self) -> usize {
        self.inner.cancellation.active_count()
    }

    #[must_use]
    pub fn concurrency_status(&self) -> QueueStatus {
        self.inner.queue.status()
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drop cached responses whose key matches `pattern` (`*` wildcards).
    pub fn invalidate_cache(&self, pattern: &str) -> usize {
        self.inner.cache.invalidate_pattern(pattern)
    }

    #[must_use]
    pub fn stats(&self) -> ClientStatsSnapshot {
        let inner = &self.inner;
        ClientStatsSnapshot::collect(
            &inner.stats,
            inner.cancellation.active_count(),
            inner.cache.stats(),
            inner.queue.status(),
            inner.pool.stats(),
            inner.retry_stats.snapshot(),
            inner.dedup.stats(),
        )
    }

    /// Receive lifecycle events for requests started after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.monitor.subscribe()
    }
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("adapter", &self.inner.adapter.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

fn cancel_error(token: &CancelToken) -> Error {
    error::canceled(token.reason().unwrap_or_else(|| "cancelled".to_string()))
}
