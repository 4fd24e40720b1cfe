//! Higher-order retry wrappers

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::{RetryManager, RetryPolicy};
use crate::error::Error;

/// Wrap `operation` so every call runs under `policy`.
///
/// ```no_run
/// use reqflow_client::retry::{with_retry, RetryPolicy};
///
/// # async fn fetch() -> Result<u32, reqflow_client::HttpError> { Ok(1) }
/// # async fn run() {
/// let fetch_with_retry = with_retry(fetch, RetryPolicy::default());
/// let value = fetch_with_retry().await;
/// # }
/// ```
pub fn with_retry<F, Fut, T>(
    operation: F,
    policy: RetryPolicy,
) -> impl Fn() -> BoxFuture<'static, Result<T, Error>> + Send + Sync
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    T: Send + 'static,
{
    let operation = Arc::new(operation);
    let manager = Arc::new(RetryManager::new(policy));

    move || {
        let operation = Arc::clone(&operation);
        let manager = Arc::clone(&manager);
        async move { manager.execute(|_| operation()).await }.boxed()
    }
}

/// Run `operation` once under the default policy (3 retries, exponential backoff).
pub async fn execute_with_default_retry<F, Fut, T>(operation: F) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    RetryManager::new(RetryPolicy::default()).execute(operation).await
}

/// Run `operation` exactly once.
pub async fn execute_without_retry<F, Fut, T>(operation: F) -> Result<T, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    RetryManager::new(RetryPolicy::no_retry()).execute(operation).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error;

    #[tokio::test(start_paused = true)]
    async fn wrapped_operation_is_retried_per_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let flaky = with_retry(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n % 2 == 0 {
                        Err(error::network("flaky"))
                    } else {
                        Ok(n)
                    }
                }
            },
            RetryPolicy::default().with_delay(Duration::from_millis(5)),
        );

        assert_eq!(flaky().await.expect("second attempt"), 1);
        assert_eq!(flaky().await.expect("fourth attempt"), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn without_retry_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = execute_without_retry(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(error::network("down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
