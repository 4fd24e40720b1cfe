use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::error::{self, Error};
use crate::http::ResponseData;

type SharedRun<T> = Shared<BoxFuture<'static, Result<T, Error>>>;

struct InFlight<T: Clone> {
    generation: u64,
    run: SharedRun<T>,
    token: CancelToken,
    waiters: Arc<AtomicUsize>,
}

/// Deduplication counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Underlying runs started
    pub executions: u64,
    /// Callers that joined a run started by someone else
    pub joined: u64,
    pub in_flight: usize,
}

/// Shares one execution between concurrent callers with the same fingerprint.
///
/// The run is spawned onto the runtime, so it settles even if every caller
/// goes away, and its registration is removed the moment it settles; a call
/// arriving afterwards starts a fresh run.
///
/// Each run gets its own [`CancelToken`]. A caller whose token fires stops
/// waiting with a cancel error without disturbing the others; when the last
/// waiter leaves, the run's token is cancelled.
pub struct DedupManager<T: Clone = ResponseData> {
    in_flight: Arc<DashMap<String, InFlight<T>>>,
    next_generation: AtomicU64,
    executions: AtomicU64,
    joined: AtomicU64,
}

impl<T: Clone> Default for DedupManager<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            joined: AtomicU64::new(0),
        }
    }
}

impl<T> DedupManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start` for `fingerprint`, or join the run already in flight.
    ///
    /// `start` receives the run's token; `caller` is the token of this
    /// particular caller.
    pub async fn execute<F, Fut>(
        &self,
        fingerprint: &str,
        caller: Option<&CancelToken>,
        start: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        if let Some(token) = caller {
            if token.is_cancelled() {
                return Err(cancelled(token));
            }
        }

        let (run, waiter) = match self.in_flight.entry(fingerprint.to_string()) {
            Entry::Occupied(entry) if !entry.get().token.is_cancelled() => {
                let in_flight = entry.get();
                self.joined.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    target: "reqflow::dedup",
                    fingerprint = fingerprint,
                    "joining in-flight request"
                );
                (
                    in_flight.run.clone(),
                    Waiter::join(&in_flight.waiters, &in_flight.token),
                )
            }
            // Vacant, or a run abandoned by its last waiter
            entry => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let token = CancelToken::new();
                let waiters = Arc::new(AtomicUsize::new(0));
                let run = self.spawn_run(fingerprint.to_string(), generation, start(token.clone()));
                self.executions.fetch_add(1, Ordering::Relaxed);

                let waiter = Waiter::join(&waiters, &token);
                entry.insert(InFlight {
                    generation,
                    run: run.clone(),
                    token,
                    waiters,
                });
                (run, waiter)
            }
        };

        let result = match caller {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(cancelled(token)),
                    result = run => result,
                }
            }
            None => run.await,
        };
        drop(waiter);
        result
    }

    fn spawn_run<Fut>(&self, fingerprint: String, generation: u64, run: Fut) -> SharedRun<T>
    where
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let map = Arc::clone(&self.in_flight);
        let key = fingerprint.clone();
        let handle = tokio::spawn(async move {
            let result = run.await;
            map.remove_if(&key, |_, entry| entry.generation == generation);
            result
        });

        let map = Arc::clone(&self.in_flight);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    map.remove_if(&fingerprint, |_, entry| entry.generation == generation);
                    Err(error::network(join_error))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Whether a run for `fingerprint` is in flight.
    pub fn is_pending(&self, fingerprint: &str) -> bool {
        self.in_flight.contains_key(fingerprint)
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            executions: self.executions.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }
}

fn cancelled(token: &CancelToken) -> Error {
    error::canceled(token.reason().unwrap_or_else(|| "request cancelled".to_string()))
}

/// Counts a caller waiting on a run; the last one out cancels the run.
struct Waiter {
    waiters: Arc<AtomicUsize>,
    token: CancelToken,
}

impl Waiter {
    fn join(waiters: &Arc<AtomicUsize>, token: &CancelToken) -> Self {
        waiters.fetch_add(1, Ordering::AcqRel);
        Self {
            waiters: Arc::clone(waiters),
            token: token.clone(),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.waiters.fetch_sub(1, Ordering::AcqRel) == 1 {
            // No-op if the run already settled.
            self.token.cancel("all callers detached");
        }
    }
}
