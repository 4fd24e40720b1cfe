mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{MockTransport, client, wait_until};
use reqflow_client::prelude::*;

fn post(
    client: &RequestExecutor,
    path: &str,
    priority: Priority,
) -> tokio::task::JoinHandle<Result<ResponseData, Error>> {
    let client = client.clone();
    let config = RequestConfig::post(format!("http://api.test{path}")).body("payload");
    tokio::spawn(async move { client.execute(config, ExecuteOptions::new().priority(priority)).await })
}

#[tokio::test]
async fn queued_requests_are_admitted_by_priority() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new().with_max_concurrent(1));

    let blocker = post(&client, "/gated/blocker", Priority::Normal);
    wait_until(|| mock.calls() == 1).await;

    let low = post(&client, "/low", Priority::Low);
    wait_until(|| client.concurrency_status().queued == 1).await;
    let critical = post(&client, "/critical", Priority::Critical);
    wait_until(|| client.concurrency_status().queued == 2).await;

    mock.release(1);
    for handle in [blocker, low, critical] {
        handle.await.expect("task").expect("response");
    }

    assert_eq!(mock.seen_paths(), vec!["/gated/blocker", "/critical", "/low"]);
}

#[tokio::test]
async fn full_queue_rejects_immediately() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new().with_max_concurrent(1).with_max_queue_size(1));

    let _blocker = post(&client, "/gated/a", Priority::Normal);
    wait_until(|| mock.calls() == 1).await;
    let _queued = post(&client, "/b", Priority::Normal);
    wait_until(|| client.concurrency_status().queued == 1).await;

    let err = client
        .post("http://api.test/c", "payload")
        .await
        .expect_err("queue full");
    assert!(err.is_queue_full());
    assert_eq!(mock.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn queue_timeout_rejects_without_running() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new().with_max_concurrent(1));

    let _blocker = post(&client, "/gated/a", Priority::Normal);
    wait_until(|| mock.calls() == 1).await;

    let err = client
        .execute(
            RequestConfig::get("http://api.test/late"),
            ExecuteOptions::new().queue_timeout(Duration::from_millis(100)),
        )
        .await
        .expect_err("queue timeout");
    assert!(err.is_queue_timeout());
    assert!(!err.is_timeout_error());
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new());

    let pending = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .execute(RequestConfig::get("http://api.test/gated/slow"), ExecuteOptions::new().request_id("r1"))
                .await
        })
    };
    wait_until(|| mock.calls() == 1).await;
    assert_eq!(client.active_request_count(), 1);

    assert!(client.cancel("r1"));
    let err = pending.await.expect("task").expect_err("cancelled");
    assert!(err.is_cancel_error());

    assert!(!client.cancel("r1"));
    assert!(!client.cancel("never-existed"));
    assert_eq!(client.active_request_count(), 0);
    assert_eq!(client.stats().requests_cancelled, 1);
}

#[tokio::test]
async fn duplicate_live_request_id_is_rejected() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new());

    let first = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .execute(RequestConfig::get("http://api.test/gated/first"), ExecuteOptions::new().request_id("dup"))
                .await
        })
    };
    wait_until(|| mock.calls() == 1).await;

    let err = client
        .execute(RequestConfig::get("http://api.test/gated/second"), ExecuteOptions::new().request_id("dup"))
        .await
        .expect_err("id in use");
    assert!(err.is_builder());
    assert_eq!(mock.calls(), 1);
    assert_eq!(client.active_request_count(), 1);

    assert!(client.cancel("dup"));
    assert!(first.await.expect("task").expect_err("cancelled").is_cancel_error());
    assert_eq!(client.active_request_count(), 0);

    let reused = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .execute(RequestConfig::get("http://api.test/gated/third"), ExecuteOptions::new().request_id("dup"))
                .await
        })
    };
    wait_until(|| mock.calls() == 2).await;
    mock.release(1);
    reused.await.expect("task").expect("id free again");
}

#[tokio::test]
async fn cancelling_a_queued_request_never_sends_it() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new().with_max_concurrent(1));

    let _blocker = post(&client, "/gated/a", Priority::Normal);
    wait_until(|| mock.calls() == 1).await;

    let queued = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .execute(RequestConfig::get("http://api.test/queued"), ExecuteOptions::new().request_id("q"))
                .await
        })
    };
    wait_until(|| client.concurrency_status().queued == 1).await;

    assert!(client.cancel("q"));
    assert!(queued.await.expect("task").expect_err("cancelled").is_cancel_error());
    assert_eq!(client.concurrency_status().queued, 0);

    mock.release(1);
    wait_until(|| client.active_request_count() == 0).await;
    assert_eq!(mock.seen_paths(), vec!["/gated/a"]);
}

#[tokio::test]
async fn cancel_by_tags_hits_only_tagged_requests() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new());

    let spawn = |path: &'static str, tag: &'static str| {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .execute(
                    RequestConfig::get(format!("http://api.test{path}")),
                    ExecuteOptions::new().tag(tag),
                )
                .await
        })
    };
    let search = spawn("/gated/search", "search");
    let profile = spawn("/gated/profile", "profile");
    wait_until(|| mock.calls() == 2).await;

    assert_eq!(client.cancel_by_tags(["search"], "new query"), 1);
    assert!(search.await.expect("task").expect_err("cancelled").is_cancel_error());

    mock.release(1);
    profile.await.expect("task").expect("untouched");
}

#[tokio::test]
async fn cancel_all_stops_everything() {
    let mock = MockTransport::ok();
    let client = client(&mock, ClientConfig::new());

    let handles: Vec<_> = ["/gated/1", "/gated/2", "/gated/3"]
        .into_iter()
        .map(|path| post(&client, path, Priority::Normal))
        .collect();
    wait_until(|| mock.calls() == 3).await;

    assert_eq!(client.cancel_all("shutdown"), 3);
    for handle in handles {
        assert!(handle.await.expect("task").expect_err("cancelled").is_cancel_error());
    }
}

#[tokio::test]
async fn pool_bounds_connections_per_host() {
    let mock = MockTransport::ok();
    let client = client(
        &mock,
        ClientConfig::new()
            .with_max_concurrent(4)
            .with_pool(
                PoolConfig::default()
                    .with_max_connections(1)
                    .with_max_connections_per_host(1),
            ),
    );

    let first = post(&client, "/gated/one", Priority::Normal);
    let second = post(&client, "/gated/two", Priority::Normal);
    wait_until(|| mock.calls() == 1 && client.stats().pool.waiting == 1).await;

    mock.release(2);
    first.await.expect("task").expect("first");
    second.await.expect("task").expect("second");

    assert_eq!(mock.max_in_flight.load(Ordering::SeqCst), 1);
    let pool = client.stats().pool;
    assert_eq!(pool.created, 1);
    assert_eq!(pool.reused, 1);
}
