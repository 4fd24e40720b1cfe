//! Mock transport shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqflow_client::error;
use reqflow_client::prelude::*;
use tokio::sync::Semaphore;

type Responder = Box<dyn Fn(&RequestConfig, usize) -> Result<ResponseData, Error> + Send + Sync>;

/// Transport that records every call.
///
/// Paths under `/gated` wait for a permit on `gate`; paths under `/hang`
/// never answer. Everything else is answered by the responder.
pub struct MockTransport {
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub seen: Mutex<Vec<RequestConfig>>,
    pub gate: Semaphore,
    responder: Responder,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&RequestConfig, usize) -> Result<ResponseData, Error> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            responder: Box::new(responder),
        })
    }

    /// Answers every request with `200 OK` and the request path as body.
    pub fn ok() -> Arc<Self> {
        Self::new(|config, _| Ok(ok(path_of(config))))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_paths(&self) -> Vec<String> {
        self.seen
            .lock()
            .expect("seen lock")
            .iter()
            .map(path_of)
            .collect()
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn request(&self, config: &RequestConfig, token: &CancelToken) -> Result<ResponseData, Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("seen lock").push(config.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        let path = path_of(config);
        if path.starts_with("/gated") {
            tokio::select! {
                permit = self.gate.acquire() => permit.expect("gate open").forget(),
                () = token.cancelled() => return Err(error::canceled("transport aborted")),
            }
        } else if path.starts_with("/hang") {
            std::future::pending::<()>().await;
        }

        (self.responder)(config, n)
    }
}

pub fn path_of(config: &RequestConfig) -> String {
    Url::parse(&config.url)
        .map(|url| url.path().to_string())
        .unwrap_or_default()
}

pub fn ok(body: impl Into<bytes::Bytes>) -> ResponseData {
    ResponseData::new(StatusCode::OK, HeaderMap::new(), body)
}

pub fn status(code: u16) -> ResponseData {
    ResponseData::new(
        StatusCode::from_u16(code).expect("valid status"),
        HeaderMap::new(),
        "",
    )
}

pub fn client(mock: &Arc<MockTransport>, config: ClientConfig) -> RequestExecutor {
    RequestExecutor::with_adapter(config, Arc::clone(mock) as Arc<dyn TransportAdapter>).expect("valid config")
}

/// Yield until `condition` holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
