use std::collections::{HashMap, VecDeque};
use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::connection::{ConnectionFactory, ConnectionInfo, ConnectionState, HostKey, LogicalConnector};
use super::stats::{PoolCounters, PoolStats};
use crate::cancel::CancelToken;
use crate::error::{self, Error, PoolUnavailable};
use crate::http::RequestConfig;

enum GrantKind {
    Reuse(ConnectionInfo),
    Create,
}

/// A slot reserved for one caller under the pool lock.
struct Grant {
    kind: GrantKind,
    epoch: u64,
}

struct Waiter {
    id: u64,
    key: HostKey,
    tx: oneshot::Sender<Grant>,
}

#[derive(Default)]
struct PoolState {
    idle: HashMap<HostKey, VecDeque<ConnectionInfo>>,
    idle_count: usize,
    /// Active connections plus reservations still being created
    busy: HashMap<HostKey, usize>,
    busy_count: usize,
    waiters: VecDeque<Waiter>,
    next_waiter: u64,
    /// Bumped by `close_all`; older connections are closed on release
    epoch: u64,
}

impl PoolState {
    fn total(&self) -> usize {
        self.idle_count + self.busy_count
    }

    fn busy_for(&self, key: &HostKey) -> usize {
        self.busy.get(key).copied().unwrap_or(0)
    }

    fn mark_busy(&mut self, key: &HostKey) {
        *self.busy.entry(key.clone()).or_insert(0) += 1;
        self.busy_count += 1;
    }

    fn unmark_busy(&mut self, key: &HostKey) {
        if let Some(count) = self.busy.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.busy.remove(key);
            }
            self.busy_count = self.busy_count.saturating_sub(1);
        }
    }
}

struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    counters: PoolCounters,
    next_id: AtomicU64,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_stale(&self, conn: &ConnectionInfo, now: Instant) -> bool {
        now.saturating_duration_since(conn.last_used_at) > self.config.idle_timeout
            || now.saturating_duration_since(conn.created_at) >= self.config.max_connection_age
            || !self.factory.is_alive(conn)
    }

    fn close(&self, mut conn: ConnectionInfo, why: &'static str) {
        conn.state = ConnectionState::Closed;
        PoolCounters::bump(&self.counters.closed);
        tracing::trace!(
            target: "reqflow::pool",
            connection_id = conn.id,
            host = %conn.host,
            reason = why,
            "connection closed"
        );
    }

    /// Most recently used healthy idle connection for `key`.
    fn take_idle_locked(&self, state: &mut PoolState, key: &HostKey, now: Instant) -> Option<ConnectionInfo> {
        let queue = state.idle.get_mut(key)?;
        let mut found = None;
        let mut dropped = Vec::new();
        while let Some(conn) = queue.pop_back() {
            if self.is_stale(&conn, now) {
                dropped.push(conn);
            } else {
                found = Some(conn);
                break;
            }
        }
        if queue.is_empty() {
            state.idle.remove(key);
        }
        state.idle_count -= dropped.len() + usize::from(found.is_some());
        for conn in dropped {
            self.close(conn, "stale");
        }
        found
    }

    /// Close the least recently used idle connection of any host.
    fn close_one_idle_locked(&self, state: &mut PoolState) -> bool {
        let Some(key) = state
            .idle
            .iter()
            .filter_map(|(key, queue)| queue.front().map(|conn| (key, conn.last_used_at)))
            .min_by_key(|(_, last_used)| *last_used)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };

        let Some(queue) = state.idle.get_mut(&key) else {
            return false;
        };
        let conn = queue.pop_front();
        if queue.is_empty() {
            state.idle.remove(&key);
        }
        match conn {
            Some(conn) => {
                state.idle_count -= 1;
                self.close(conn, "capacity");
                true
            }
            None => false,
        }
    }

    /// Reserve a slot for `key` if limits allow.
    fn grant_locked(&self, state: &mut PoolState, key: &HostKey, now: Instant) -> Option<Grant> {
        if state.busy_for(key) >= self.config.max_connections_per_host {
            return None;
        }

        let kind = if let Some(conn) = self.take_idle_locked(state, key, now) {
            GrantKind::Reuse(conn)
        } else if state.total() < self.config.max_connections || self.close_one_idle_locked(state) {
            GrantKind::Create
        } else {
            return None;
        };

        state.mark_busy(key);
        Some(Grant {
            kind,
            epoch: state.epoch,
        })
    }

    fn rollback_locked(&self, state: &mut PoolState, key: &HostKey, grant: Grant) {
        state.unmark_busy(key);
        if let GrantKind::Reuse(conn) = grant.kind {
            state.idle.entry(key.clone()).or_default().push_back(conn);
            state.idle_count += 1;
        }
    }

    /// Hand freed capacity to waiters, oldest first.
    fn dispatch_locked(&self, state: &mut PoolState) {
        let now = Instant::now();
        let mut index = 0;
        while index < state.waiters.len() {
            if state.waiters[index].tx.is_closed() {
                state.waiters.remove(index);
                continue;
            }

            let key = state.waiters[index].key.clone();
            match self.grant_locked(state, &key, now) {
                Some(grant) => {
                    let Some(waiter) = state.waiters.remove(index) else {
                        self.rollback_locked(state, &key, grant);
                        break;
                    };
                    if let Err(grant) = waiter.tx.send(grant) {
                        self.rollback_locked(state, &key, grant);
                    }
                }
                None => {
                    if state.total() >= self.config.max_connections && state.idle_count == 0 {
                        break;
                    }
                    index += 1;
                }
            }
        }
    }

    fn release_locked(&self, state: &mut PoolState, mut conn: ConnectionInfo, epoch: u64, reusable: bool) {
        let key = conn.key();
        state.unmark_busy(&key);

        let now = Instant::now();
        conn.last_used_at = now;
        let keep = reusable
            && epoch == state.epoch
            && now.saturating_duration_since(conn.created_at) < self.config.max_connection_age;

        if keep {
            conn.state = ConnectionState::Idle;
            state.idle.entry(key).or_default().push_back(conn);
            state.idle_count += 1;
            while state.idle_count > self.config.max_idle {
                if !self.close_one_idle_locked(state) {
                    break;
                }
            }
        } else {
            self.close(conn, if reusable { "expired" } else { "discarded" });
        }

        self.dispatch_locked(state);
    }
}

/// Bounded pool of logical per-host connections.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self::with_factory(config, Arc::new(LogicalConnector))
    }

    pub fn with_factory(config: PoolConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                factory,
                state: Mutex::new(PoolState::default()),
                counters: PoolCounters::default(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Connection for the host `config` targets, waiting if limits are reached.
    pub async fn get_connection(&self, config: &RequestConfig) -> Result<PooledConnection, Error> {
        let key = HostKey::from_url(&config.resolved_url()?)?;
        self.acquire(key, config.cancel_token.as_ref()).await
    }

    /// Connection for `key`; a fired `token` abandons the wait with a cancel error.
    pub async fn acquire(&self, key: HostKey, token: Option<&CancelToken>) -> Result<PooledConnection, Error> {
        let shared = &self.shared;

        let immediate = {
            let mut state = shared.lock();
            let queued_same_host = state.waiters.iter().any(|w| w.key == key);
            let grant = if queued_same_host {
                None
            } else {
                shared.grant_locked(&mut state, &key, Instant::now())
            };
            match grant {
                Some(grant) => Ok(grant),
                None => {
                    let (tx, rx) = oneshot::channel();
                    let id = state.next_waiter;
                    state.next_waiter += 1;
                    state.waiters.push_back(Waiter {
                        id,
                        key: key.clone(),
                        tx,
                    });
                    Err(WaitGuard {
                        shared: Arc::clone(shared),
                        id,
                        key: key.clone(),
                        rx,
                        armed: true,
                    })
                }
            }
        };

        let grant = match immediate {
            Ok(grant) => grant,
            Err(mut waiting) => {
                PoolCounters::bump(&shared.counters.waited);
                tracing::debug!(target: "reqflow::pool", host = %key, "waiting for a connection slot");
                let grant = waiting.wait(token, shared.config.acquire_timeout).await?;
                waiting.armed = false;
                grant
            }
        };

        match grant.kind {
            GrantKind::Reuse(mut conn) => {
                conn.state = ConnectionState::Active;
                conn.use_count += 1;
                conn.last_used_at = Instant::now();
                PoolCounters::bump(&shared.counters.reused);
                Ok(PooledConnection::new(Arc::clone(shared), conn, grant.epoch))
            }
            GrantKind::Create => self.create(key, grant.epoch).await,
        }
    }

    async fn create(&self, key: HostKey, epoch: u64) -> Result<PooledConnection, Error> {
        let shared = &self.shared;
        let mut reservation = Reservation {
            shared: Arc::clone(shared),
            key: key.clone(),
            armed: true,
        };

        if let Err(e) = shared.factory.connect(&key).await {
            PoolCounters::bump(&shared.counters.create_failures);
            tracing::warn!(target: "reqflow::pool", host = %key, error = %e, "connection creation failed");
            return Err(error::network(PoolUnavailable {
                host: key.to_string(),
                reason: e.to_string(),
            }));
        }
        reservation.armed = false;

        PoolCounters::bump(&shared.counters.created);
        let mut conn = ConnectionInfo::new(shared.next_id.fetch_add(1, Ordering::Relaxed), &key);
        conn.use_count = 1;
        tracing::trace!(target: "reqflow::pool", connection_id = conn.id, host = %key, "connection created");
        Ok(PooledConnection::new(Arc::clone(shared), conn, epoch))
    }

    /// Close idle connections past their idle timeout or maximum age.
    pub fn trim_idle(&self) -> usize {
        let shared = &self.shared;
        let mut state = shared.lock();
        let now = Instant::now();

        let mut stale = Vec::new();
        for queue in state.idle.values_mut() {
            let mut fresh = VecDeque::with_capacity(queue.len());
            for conn in queue.drain(..) {
                if shared.is_stale(&conn, now) {
                    stale.push(conn);
                } else {
                    fresh.push_back(conn);
                }
            }
            *queue = fresh;
        }
        state.idle.retain(|_, queue| !queue.is_empty());
        state.idle_count -= stale.len();

        let trimmed = stale.len();
        for conn in stale {
            shared.close(conn, "idle timeout");
        }
        shared.dispatch_locked(&mut state);
        trimmed
    }

    /// Close every idle connection; active ones close when released.
    pub fn close_all(&self) -> usize {
        let shared = &self.shared;
        let mut state = shared.lock();
        let idle: Vec<ConnectionInfo> = state.idle.drain().flat_map(|(_, queue)| queue).collect();
        state.idle_count = 0;
        state.epoch += 1;

        let closed = idle.len();
        for conn in idle {
            shared.close(conn, "pool closed");
        }
        shared.dispatch_locked(&mut state);
        closed
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats::from_counters(
            &self.shared.counters,
            state.total(),
            state.busy_count,
            state.idle_count,
            state.waiters.len(),
        )
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Queue position of a caller waiting for a slot.
///
/// Dropped while still armed, it leaves the queue; a grant that raced the
/// departure is returned to the pool.
struct WaitGuard {
    shared: Arc<PoolShared>,
    id: u64,
    key: HostKey,
    rx: oneshot::Receiver<Grant>,
    armed: bool,
}

impl WaitGuard {
    async fn wait(
        &mut self,
        token: Option<&CancelToken>,
        limit: Option<std::time::Duration>,
    ) -> Result<Grant, Error> {
        let cancelled = async {
            match token {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };
        let timed_out = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => pending().await,
            }
        };

        tokio::select! {
            biased;
            () = cancelled => Err(error::canceled(
                token
                    .and_then(CancelToken::reason)
                    .unwrap_or_else(|| "cancelled while waiting for a connection".to_string()),
            )),
            () = timed_out => Err(error::timeout(limit.unwrap_or_default())),
            grant = &mut self.rx => grant.map_err(|_| error::network(PoolUnavailable {
                host: self.key.to_string(),
                reason: "pool shut down".to_string(),
            })),
        }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.shared.lock();
        if let Some(position) = state.waiters.iter().position(|w| w.id == self.id) {
            state.waiters.remove(position);
            return;
        }
        if let Ok(grant) = self.rx.try_recv() {
            self.shared.rollback_locked(&mut state, &self.key, grant);
            self.shared.dispatch_locked(&mut state);
        }
    }
}

/// Slot reserved while a connection is being created.
struct Reservation {
    shared: Arc<PoolShared>,
    key: HostKey,
    armed: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.lock();
            state.unmark_busy(&self.key);
            self.shared.dispatch_locked(&mut state);
        }
    }
}

/// An active connection; returns to the pool when dropped.
pub struct PooledConnection {
    shared: Arc<PoolShared>,
    info: Option<ConnectionInfo>,
    epoch: u64,
    reusable: bool,
}

impl PooledConnection {
    fn new(shared: Arc<PoolShared>, info: ConnectionInfo, epoch: u64) -> Self {
        Self {
            shared,
            info: Some(info),
            epoch,
            reusable: true,
        }
    }

    /// Bookkeeping record of this connection.
    #[must_use]
    pub fn info(&self) -> &ConnectionInfo {
        self.info.as_ref().unwrap_or_else(|| unreachable!("connection record taken before drop"))
    }

    /// Return the connection to the pool now.
    pub fn release(self) {}

    /// Close the connection instead of returning it, e.g. after an I/O failure.
    pub fn discard(mut self) {
        self.reusable = false;
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").field("info", &self.info).finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(info) = self.info.take() {
            let mut state = self.shared.lock();
            self.shared
                .release_locked(&mut state, info, self.epoch, self.reusable);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    fn key(host: &str) -> HostKey {
        HostKey {
            protocol: "http".to_string(),
            host: host.to_string(),
            port: 80,
        }
    }

    #[tokio::test]
    async fn released_connections_are_reused() {
        let pool = ConnectionPool::new(PoolConfig::default());
        let first = pool.acquire(key("a"), None).await.expect("slot");
        let id = first.info().id;
        first.release();

        let second = pool.acquire(key("a"), None).await.expect("slot");
        assert_eq!(second.info().id, id);
        assert_eq!(second.info().use_count, 2);
        assert_eq!(pool.stats().reused, 1);
    }

    #[tokio::test]
    async fn waiter_is_served_when_a_slot_frees() {
        let pool = ConnectionPool::new(PoolConfig::default().with_max_connections(2).with_max_connections_per_host(2));
        let a = pool.acquire(key("a"), None).await.expect("slot");
        let _b = pool.acquire(key("a"), None).await.expect("slot");

        let waiting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(key("a"), None).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiting.is_finished());
        assert_eq!(pool.stats().waiting, 1);

        drop(a);
        let third = waiting.await.expect("task").expect("slot");
        assert_eq!(third.info().use_count, 2);
        assert_eq!(pool.stats().total, 2);
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let pool = ConnectionPool::new(PoolConfig::default().with_max_connections(1));
        let held = pool.acquire(key("a"), None).await.expect("slot");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for n in 0..3 {
            let pool = pool.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let conn = pool.acquire(key("a"), None).await.expect("slot");
                tx.send(n).expect("receiver alive");
                tokio::time::sleep(Duration::from_millis(1)).await;
                drop(conn);
            });
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(held);

        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(rx.recv().await.expect("served"));
        }
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn per_host_cap_does_not_block_other_hosts() {
        let pool = ConnectionPool::new(PoolConfig::default().with_max_connections_per_host(1));
        let _a = pool.acquire(key("a"), None).await.expect("slot");
        let b = tokio::time::timeout(Duration::from_millis(50), pool.acquire(key("b"), None)).await;
        assert!(b.is_ok());
    }

    struct Refusing;

    #[async_trait]
    impl ConnectionFactory for Refusing {
        async fn connect(&self, _key: &HostKey) -> Result<(), Error> {
            Err(error::network("connection refused"))
        }
    }

    #[tokio::test]
    async fn creation_failure_is_a_network_error_and_leaks_nothing() {
        let pool = ConnectionPool::with_factory(PoolConfig::default(), Arc::new(Refusing));
        let err = pool.acquire(key("a"), None).await.expect_err("refused");
        assert!(err.is_network_error());

        let stats = pool.stats();
        assert_eq!((stats.total, stats.active, stats.create_failures), (0, 0, 1));
    }

    #[tokio::test]
    async fn cancelled_waiter_leaves_the_queue() {
        let pool = ConnectionPool::new(PoolConfig::default().with_max_connections(1));
        let _held = pool.acquire(key("a"), None).await.expect("slot");
        let token = CancelToken::new();

        let waiting = {
            let pool = pool.clone();
            let token = token.clone();
            tokio::spawn(async move { pool.acquire(key("a"), Some(&token)).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel("gave up");

        let err = waiting.await.expect("task").expect_err("cancelled");
        assert!(err.is_cancel_error());
        assert_eq!(pool.stats().waiting, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connections_are_trimmed() {
        let pool = ConnectionPool::new(PoolConfig::default().with_idle_timeout(Duration::from_secs(30)));
        pool.acquire(key("a"), None).await.expect("slot").release();
        pool.acquire(key("b"), None).await.expect("slot").release();
        assert_eq!(pool.stats().idle, 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(pool.trim_idle(), 2);
        assert_eq!(pool.stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn old_connections_are_not_reused() {
        let pool = ConnectionPool::new(
            PoolConfig::default()
                .with_max_connection_age(Duration::from_secs(60))
                .with_idle_timeout(Duration::from_secs(600)),
        );
        let conn = pool.acquire(key("a"), None).await.expect("slot");
        let first_id = conn.info().id;
        tokio::time::advance(Duration::from_secs(59)).await;
        conn.release();
        tokio::time::advance(Duration::from_secs(2)).await;

        let fresh = pool.acquire(key("a"), None).await.expect("slot");
        assert_ne!(fresh.info().id, first_id);
    }
}
