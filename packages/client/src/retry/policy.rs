//! Retry policy configuration with backoff strategies and jitter

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{ConfigResult, ConfigurationError, Validator};
use crate::error::Error;

/// Predicate deciding whether `error` on attempt `attempt` (0-based) is retried.
pub type RetryCondition = Arc<dyn Fn(&Error, u32) -> bool + Send + Sync>;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `delay`
    Fixed,
    /// `delay * (attempt + 1)`
    Linear,
    /// `delay * 2^attempt`
    #[default]
    Exponential,
}

/// Retry policy configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `retries + 1`
    pub retries: u32,
    /// Base delay before the first retry
    #[serde(with = "crate::config::serde_millis")]
    pub retry_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Upper bound applied to the backoff before jitter
    #[serde(with = "crate::config::serde_millis")]
    pub max_delay: Duration,
    /// Add a random offset to each delay
    pub jitter: bool,
    /// Jitter offset is drawn from `[0, jitter_factor * delay)`
    pub jitter_factor: f64,
    /// Replaces the default retryable-error predicate when set
    #[serde(skip)]
    pub retry_condition: Option<RetryCondition>,
}

impl Default for RetryPolicy {
    /// Three retries, exponential backoff from one second, capped at 30 seconds.
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(1000),
            strategy: BackoffStrategy::Exponential,
            max_delay: Duration::from_secs(30),
            jitter: false,
            jitter_factor: 0.1,
            retry_condition: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("strategy", &self.strategy)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .field("jitter_factor", &self.jitter_factor)
            .field("retry_condition", &self.retry_condition.is_some())
            .finish()
    }
}

impl RetryPolicy {
    /// Faster retry cycles with more attempts for operations that must succeed.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            retries: 5,
            retry_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: true,
            jitter_factor: 0.2,
            ..Self::default()
        }
    }

    /// Longer delays and fewer attempts for non-critical operations.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            retries: 2,
            retry_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: true,
            jitter_factor: 0.05,
            ..Self::default()
        }
    }

    /// Single attempt only.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            retries: 0,
            retry_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter = true;
        self.jitter_factor = factor;
        self
    }

    #[must_use]
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Error, u32) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Some(Arc::new(condition));
        self
    }

    /// Total attempts including the first
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (0 = first retry).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = match self.strategy {
            BackoffStrategy::Fixed => self.retry_delay,
            BackoffStrategy::Linear => self.retry_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential => self
                .retry_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        let capped = base.min(self.max_delay);

        if !self.jitter || self.jitter_factor <= 0.0 {
            return capped;
        }

        let range_ms = capped.as_millis() as f64 * self.jitter_factor;
        let offset = fastrand::f64() * range_ms;
        capped + Duration::from_millis(offset as u64)
    }

    /// Whether `error` on attempt `attempt` should be retried.
    ///
    /// Cancellation is never retried. Without a custom condition, failures
    /// with no response (network, timeout) and 5xx responses are retried.
    #[must_use]
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        if error.is_cancel_error() {
            return false;
        }
        match &self.retry_condition {
            Some(condition) => condition(error, attempt),
            None => Self::is_retryable_error(error),
        }
    }

    /// Default classification used when no custom condition is set.
    #[must_use]
    pub fn is_retryable_error(error: &Error) -> bool {
        error.is_network_error() || error.is_timeout_error() || error.is_server_error()
    }
}

impl Validator for RetryPolicy {
    fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigurationError::InvalidParameter(
                "jitter_factor must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.retry_delay > self.max_delay {
            return Err(ConfigurationError::Conflict(
                "retry_delay cannot exceed max_delay".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::error::{self, Kind};

    #[test]
    fn exponential_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(4000));
    }

    #[test]
    fn linear_and_fixed() {
        let linear = RetryPolicy::default().with_strategy(BackoffStrategy::Linear);
        assert_eq!(linear.calculate_delay(2), Duration::from_millis(3000));

        let fixed = RetryPolicy::default().with_strategy(BackoffStrategy::Fixed);
        assert_eq!(fixed.calculate_delay(7), Duration::from_millis(1000));
    }

    #[test]
    fn delay_is_clamped() {
        let policy = RetryPolicy::default().with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(10), Duration::from_secs(5));
        assert_eq!(policy.calculate_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let policy = RetryPolicy::default().with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.calculate_delay(0);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay < Duration::from_millis(1500));
        }
    }

    #[test]
    fn default_predicate() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&error::network("reset"), 0));
        assert!(policy.should_retry(&error::timeout(Duration::from_secs(1)), 0));
        assert!(policy.should_retry(&error::status_code(StatusCode::SERVICE_UNAVAILABLE), 0));
        assert!(!policy.should_retry(&error::status_code(StatusCode::NOT_FOUND), 0));
        assert!(!policy.should_retry(&error::canceled("user"), 0));
    }

    #[test]
    fn custom_condition_never_sees_cancellation() {
        let policy = RetryPolicy::default().with_condition(|_, _| true);
        assert!(policy.should_retry(&Error::new(Kind::Status(StatusCode::BAD_REQUEST)), 0));
        assert!(!policy.should_retry(&error::canceled("user"), 0));
    }

    #[test]
    fn validation_rejects_bad_jitter() {
        let mut policy = RetryPolicy::default();
        policy.jitter_factor = 1.5;
        assert!(policy.validate().is_err());
    }
}
