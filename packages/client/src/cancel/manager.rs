//! Request id → cancellation handle registry

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;

use super::token::CancelToken;
use crate::error::{self, Error};

/// Bookkeeping for one in-flight request.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub created_at: Instant,
    pub tags: BTreeSet<String>,
    /// Token the pipeline observes; fires on explicit, tag, bulk or timeout cancellation
    pub token: CancelToken,
    /// Caller-supplied token linked into `token`
    pub external: Option<CancelToken>,
}

/// Maps request ids to their cancellation handles.
///
/// Registration happens at dispatch and `cleanup` at the terminal outcome.
/// Every cancel operation on an unknown or already-cancelled id is a no-op.
#[derive(Debug, Default)]
pub struct CancellationManager {
    requests: DashMap<String, RequestMetadata>,
}

impl CancellationManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and return the token the pipeline should observe.
    ///
    /// When `external` is given the returned token is the any-of composite of a
    /// fresh internal token and the external one. An id that is still
    /// registered is rejected with a builder error and the live entry is left
    /// untouched.
    pub fn register(
        &self,
        id: impl Into<String>,
        tags: BTreeSet<String>,
        external: Option<CancelToken>,
    ) -> Result<CancelToken, Error> {
        let slot = match self.requests.entry(id.into()) {
            Entry::Occupied(live) => {
                return Err(error::builder(format!(
                    "request id `{}` is already in flight",
                    live.key()
                )));
            }
            Entry::Vacant(slot) => slot,
        };
        let id = slot.key().clone();
        let token = match &external {
            Some(external) => external.child(),
            None => CancelToken::new(),
        };

        tracing::trace!(
            target: "reqflow::cancel",
            request_id = %id,
            tags = ?tags,
            "registered request"
        );

        slot.insert(RequestMetadata {
            created_at: Instant::now(),
            tags,
            token: token.clone(),
            external,
        });
        Ok(token)
    }

    /// Cancel a single request. Returns `true` if the request was cancelled by this call.
    pub fn cancel(&self, id: &str, reason: &str) -> bool {
        let token = match self.requests.get(id) {
            Some(meta) => meta.token.clone(),
            None => return false,
        };
        let cancelled = token.cancel(reason);
        if cancelled {
            tracing::debug!(target: "reqflow::cancel", request_id = %id, reason, "request cancelled");
        }
        cancelled
    }

    /// Cancel every request carrying at least one of `tags`. Returns the number cancelled.
    pub fn cancel_by_tags<I, S>(&self, tags: I, reason: &str) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<String> = tags.into_iter().map(|t| t.as_ref().to_string()).collect();
        let tokens: Vec<CancelToken> = self
            .requests
            .iter()
            .filter(|entry| entry.value().tags.iter().any(|t| wanted.contains(t)))
            .map(|entry| entry.value().token.clone())
            .collect();

        let count = tokens.into_iter().filter(|token| token.cancel(reason)).count();
        tracing::debug!(target: "reqflow::cancel", tags = ?wanted, count, "cancelled by tags");
        count
    }

    /// Cancel every registered request. Returns the number cancelled.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let tokens: Vec<CancelToken> = self
            .requests
            .iter()
            .map(|entry| entry.value().token.clone())
            .collect();

        let count = tokens.into_iter().filter(|token| token.cancel(reason)).count();
        tracing::debug!(target: "reqflow::cancel", count, reason, "cancelled all requests");
        count
    }

    /// Cancel `id` once `after` elapses unless it finished first.
    pub fn cancel_after(&self, id: &str, after: Duration) -> Option<JoinHandle<()>> {
        let token = self.requests.get(id).map(|meta| meta.token.clone())?;
        let request_id = id.to_string();
        Some(tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(after) => {
                    if token.cancel(format!("timed out after {}ms", after.as_millis())) {
                        tracing::debug!(target: "reqflow::cancel", request_id = %request_id, "request timed out");
                    }
                }
                () = token.cancelled() => {}
            }
        }))
    }

    /// Forget a finished request. Returns `false` if it was not registered.
    pub fn cleanup(&self, id: &str) -> bool {
        self.requests.remove(id).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, id: &str) -> bool {
        self.requests.contains_key(id)
    }

    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<RequestMetadata> {
        self.requests.get(id).map(|meta| meta.value().clone())
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        self.requests.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn cancel_is_idempotent() {
        let manager = CancellationManager::new();
        let token = manager.register("a", BTreeSet::new(), None).expect("fresh id");

        assert!(manager.cancel("a", "user"));
        assert!(token.is_cancelled());
        assert!(!manager.cancel("a", "again"));
        assert!(!manager.cancel("missing", "nobody"));

        assert!(manager.cleanup("a"));
        assert!(!manager.cleanup("a"));
        assert!(!manager.cancel("a", "after cleanup"));
    }

    #[test]
    fn cancel_by_tags_only_hits_tagged() {
        let manager = CancellationManager::new();
        let search = manager.register("1", tags(&["search"]), None).expect("fresh id");
        let both = manager.register("2", tags(&["search", "page"]), None).expect("fresh id");
        let other = manager.register("3", tags(&["upload"]), None).expect("fresh id");

        assert_eq!(manager.cancel_by_tags(["search"], "navigated"), 2);
        assert!(search.is_cancelled());
        assert!(both.is_cancelled());
        assert!(!other.is_cancelled());
    }

    #[test]
    fn external_token_links_into_registration() {
        let manager = CancellationManager::new();
        let external = CancelToken::new();
        let token = manager.register("x", BTreeSet::new(), Some(external.clone())).expect("fresh id");

        external.cancel("component unmounted");
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_all_counts_live_requests() {
        let manager = CancellationManager::new();
        manager.register("1", BTreeSet::new(), None).expect("fresh id");
        manager.register("2", BTreeSet::new(), None).expect("fresh id");
        manager.cancel("1", "early");

        assert_eq!(manager.cancel_all("shutdown"), 1);
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn live_id_cannot_be_registered_twice() {
        let manager = CancellationManager::new();
        let first = manager.register("dup", BTreeSet::new(), None).expect("fresh id");

        let err = manager
            .register("dup", tags(&["late"]), None)
            .expect_err("still in flight");
        assert!(err.is_builder());

        assert!(manager.cancel("dup", "user"));
        assert!(first.is_cancelled());

        assert!(manager.cleanup("dup"));
        manager.register("dup", BTreeSet::new(), None).expect("free again");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fires_on_deadline() {
        let manager = CancellationManager::new();
        let token = manager.register("slow", BTreeSet::new(), None).expect("fresh id");
        let handle = manager
            .cancel_after("slow", Duration::from_millis(50))
            .expect("registered id");

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.await.expect("timer task");
        assert!(token.is_cancelled());
    }
}
