use std::future::Future;
use std::sync::Arc;

use super::{RetryPolicy, RetryStats};
use crate::cancel::CancelToken;
use crate::error::{self, Error};

/// Runs an attempt function under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryManager {
    policy: RetryPolicy,
    stats: Arc<RetryStats>,
}

impl RetryManager {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: Arc::new(RetryStats::new()),
        }
    }

    /// Share counters with another manager (per-request overrides report
    /// into the client's stats).
    #[must_use]
    pub fn with_stats(policy: RetryPolicy, stats: Arc<RetryStats>) -> Self {
        Self { policy, stats }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<RetryStats> {
        &self.stats
    }

    /// Call `attempt` until it succeeds, the policy refuses, or attempts run out.
    ///
    /// `attempt` receives the 0-based attempt number. The error returned
    /// after exhaustion is the last attempt's error, unchanged.
    pub async fn execute<F, Fut, T>(&self, attempt: F) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.execute_with_token(attempt, None).await
    }

    /// Like [`execute`](Self::execute) but backoff sleeps end early with a
    /// cancel error when `token` fires.
    pub async fn execute_with_token<F, Fut, T>(
        &self,
        mut attempt: F,
        token: Option<&CancelToken>,
    ) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.stats.record_operation();
        let mut n = 0u32;

        loop {
            let err = match attempt(n).await {
                Ok(value) => {
                    self.stats.record_success();
                    return Ok(value);
                }
                Err(err) => err,
            };

            if n >= self.policy.retries || !self.policy.should_retry(&err, n) {
                self.stats.record_failure();
                if n > 0 {
                    tracing::debug!(
                        target: "reqflow::retry",
                        attempts = n + 1,
                        error = %err,
                        "giving up after retries"
                    );
                }
                return Err(err);
            }

            let delay = self.policy.calculate_delay(n);
            self.stats.record_retry();
            tracing::debug!(
                target: "reqflow::retry",
                attempt = n + 1,
                max_attempts = self.policy.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after failure"
            );

            match token {
                Some(token) => {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = token.cancelled() => {
                            self.stats.record_failure();
                            return Err(error::canceled(
                                token.reason().unwrap_or_else(|| "cancelled during backoff".to_string()),
                            ));
                        }
                    }
                }
                None => tokio::time::sleep(delay).await,
            }

            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use http::StatusCode;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_retries_plus_one() {
        let manager = RetryManager::new(RetryPolicy::default().with_retries(3));
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> = manager
            .execute(|n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(error::status_code(StatusCode::SERVICE_UNAVAILABLE)
                        .with(format!("attempt {n}")))
                }
            })
            .await;

        let err = result.expect_err("always fails");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.to_string().contains("attempt 3"));
        assert_eq!(manager.stats().snapshot().retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_non_retryable() {
        let manager = RetryManager::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), Error> = manager
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(error::status_code(StatusCode::BAD_REQUEST)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_later_attempt() {
        let manager = RetryManager::new(RetryPolicy::default().with_delay(Duration::from_millis(10)));

        let value = manager
            .execute(|n| async move {
                if n < 2 {
                    Err(error::network("connection reset"))
                } else {
                    Ok(n)
                }
            })
            .await
            .expect("third attempt succeeds");

        assert_eq!(value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let manager = RetryManager::new(RetryPolicy::default().with_delay(Duration::from_secs(60)));
        let token = CancelToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel("user navigated away");
        });

        let result: Result<(), Error> = manager
            .execute_with_token(|_| async { Err(error::network("down")) }, Some(&token))
            .await;

        assert!(result.expect_err("cancelled").is_cancel_error());
    }
}
