mod common;

use std::time::Duration;

use common::{MockTransport, client, ok, status};
use reqflow_client::prelude::*;

fn fast_retry(retries: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_retries(retries)
        .with_delay(Duration::from_millis(10))
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_retried_until_exhausted() {
    let mock = MockTransport::new(|_, _| Ok(status(503)));
    let client = client(&mock, ClientConfig::new().with_retry(fast_retry(2)));

    let err = client.get("http://api.test/flaky").await.expect_err("exhausted");
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(mock.calls(), 3);

    let stats = client.stats();
    assert_eq!(stats.retry.retries, 2);
    assert_eq!(stats.retry.failures, 1);
    assert_eq!(stats.requests_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers() {
    let mock = MockTransport::new(|_, n| if n == 0 { Ok(status(503)) } else { Ok(ok("fine")) });
    let client = client(&mock, ClientConfig::new().with_retry(fast_retry(3)));

    let response = client.get("http://api.test/flaky").await.expect("recovered");
    assert_eq!(&response.data()[..], b"fine");
    assert_eq!(mock.calls(), 2);
    assert_eq!(client.stats().retry.successes, 1);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let mock = MockTransport::new(|_, _| Ok(status(400)));
    let client = client(&mock, ClientConfig::new().with_retry(fast_retry(3)));

    let err = client.get("http://api.test/bad").await.expect_err("rejected");
    assert!(err.is_client_error());
    assert_eq!(mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn per_request_policy_overrides_the_client() {
    let mock = MockTransport::new(|_, _| Ok(status(502)));
    let client = client(&mock, ClientConfig::new().with_retry(fast_retry(3)));

    let config = RequestConfig::get("http://api.test/once").retry(RetryPolicy::no_retry());
    client.send(config).await.expect_err("failed");
    assert_eq!(mock.calls(), 1);

    client
        .execute(
            RequestConfig::get("http://api.test/skip"),
            ExecuteOptions::new().skip_retry(),
        )
        .await
        .expect_err("failed");
    assert_eq!(mock.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_responses_time_out() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new().with_retry(RetryPolicy::no_retry()));

    let config = RequestConfig::get("http://api.test/hang").timeout(Duration::from_millis(50));
    let err = client.send(config).await.expect_err("timed out");
    assert!(err.is_timeout_error());
    assert!(!err.is_cancel_error());
    assert_eq!(client.active_request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retried() {
    let mock = MockTransport::new(|_, _| Ok(ok("late but fine")));
    let client = client(&mock, ClientConfig::new().with_retry(fast_retry(1)));

    let config = RequestConfig::get("http://api.test/hang").timeout(Duration::from_millis(50));
    let err = client.send(config).await.expect_err("timed out twice");
    assert!(err.is_timeout_error());
    assert_eq!(mock.calls(), 2);
}
