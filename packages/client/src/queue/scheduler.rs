//! Bounded priority scheduler with cooperative cancellation

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::priority::Priority;
use crate::cancel::CancelToken;
use crate::error::{self, Error};

/// Scheduler limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Running-slot ceiling
    pub max_concurrent: usize,
    /// Queued-item ceiling; enqueue beyond it fails fast
    pub max_queue_size: usize,
    /// Waiting time after which a queued item is promoted one tier
    #[serde(with = "crate::config::serde_millis_opt")]
    pub boost_interval: Option<Duration>,
    /// Admission window applied when the caller gives none
    #[serde(with = "crate::config::serde_millis_opt")]
    pub default_queue_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 6,
            max_queue_size: 1000,
            boost_interval: Some(Duration::from_secs(5)),
            default_queue_timeout: None,
        }
    }
}

/// Per-item admission options.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub id: String,
    pub priority: Priority,
    pub queue_timeout: Option<Duration>,
    /// Token observed while queued and while running
    pub token: Option<CancelToken>,
}

impl EnqueueOptions {
    pub fn new(id: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            priority,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn token(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    /// Queued items per effective priority, most urgent first
    pub queued_by_priority: [usize; 5],
    pub admitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub boosted: u64,
}

struct QueuedItem {
    id: String,
    base_priority: Priority,
    enqueued_at: Instant,
    admit: oneshot::Sender<Result<(), Error>>,
    token: CancelToken,
}

struct RunningItem {
    id: String,
    token: CancelToken,
}

#[derive(Default)]
struct QueueState {
    /// (effective priority, sequence) → item
    queued: BTreeMap<(Priority, u64), QueuedItem>,
    /// sequence → current effective priority of a queued item
    positions: HashMap<u64, Priority>,
    running: HashMap<u64, RunningItem>,
    next_seq: u64,
}

impl QueueState {
    fn take_queued(&mut self, seq: u64) -> Option<QueuedItem> {
        let priority = self.positions.remove(&seq)?;
        self.queued.remove(&(priority, seq))
    }
}

#[derive(Default)]
struct QueueCounters {
    admitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
    boosted: AtomicU64,
}

enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

/// Admission-controlled priority queue.
///
/// Items move `queued → running → completed | failed | cancelled`. The work
/// future is not polled until the item is admitted, so cancelling a queued
/// item guarantees its work never starts.
pub struct PriorityQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    counters: QueueCounters,
}

impl PriorityQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
            counters: QueueCounters::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Wait for a running slot, then drive `work` to completion.
    ///
    /// Fails fast with a queue-full error when the queue is at capacity,
    /// with a queue-timeout error when not admitted within the window, and
    /// with a cancel error when the item's token fires first.
    pub async fn enqueue<Fut, T>(&self, options: EnqueueOptions, work: Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, Error>>,
    {
        let token = options.token.clone().unwrap_or_default();
        let (seq, admission) = self.admit_or_wait(&options, &token)?;

        if let Some(admission) = admission {
            let pending = PendingGuard {
                queue: self,
                seq,
                armed: true,
            };
            if let Err(e) = self.wait_for_admission(&options, &token, admission).await {
                if e.is_cancel_error() {
                    self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                }
                return Err(e);
            }
            pending.disarm();
        }

        let mut slot = SlotGuard {
            queue: self,
            seq,
            outcome: Outcome::Cancelled,
        };

        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(cancel_error(&token)),
            result = work => result,
        };

        slot.outcome = match &result {
            Ok(_) => Outcome::Completed,
            Err(e) if e.is_cancel_error() => Outcome::Cancelled,
            Err(_) => Outcome::Failed,
        };
        result
    }

    fn admit_or_wait(
        &self,
        options: &EnqueueOptions,
        token: &CancelToken,
    ) -> Result<(u64, Option<oneshot::Receiver<Result<(), Error>>>), Error> {
        if token.is_cancelled() {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            return Err(cancel_error(token));
        }

        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;

        if state.queued.is_empty() && state.running.len() < self.config.max_concurrent {
            state.running.insert(
                seq,
                RunningItem {
                    id: options.id.clone(),
                    token: token.clone(),
                },
            );
            self.counters.admitted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                target: "reqflow::queue",
                request_id = %options.id,
                priority = %options.priority,
                "admitted immediately"
            );
            return Ok((seq, None));
        }

        if state.queued.len() >= self.config.max_queue_size {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                target: "reqflow::queue",
                request_id = %options.id,
                max_queue_size = self.config.max_queue_size,
                "queue full, rejecting request"
            );
            return Err(error::queue_full(self.config.max_queue_size));
        }

        let (tx, rx) = oneshot::channel();
        state.queued.insert(
            (options.priority, seq),
            QueuedItem {
                id: options.id.clone(),
                base_priority: options.priority,
                enqueued_at: Instant::now(),
                admit: tx,
                token: token.clone(),
            },
        );
        state.positions.insert(seq, options.priority);
        tracing::debug!(
            target: "reqflow::queue",
            request_id = %options.id,
            priority = %options.priority,
            queued = state.queued.len(),
            running = state.running.len(),
            "request queued"
        );

        Ok((seq, Some(rx)))
    }

    async fn wait_for_admission(
        &self,
        options: &EnqueueOptions,
        token: &CancelToken,
        admission: oneshot::Receiver<Result<(), Error>>,
    ) -> Result<(), Error> {
        let window = options.queue_timeout.or(self.config.default_queue_timeout);
        let deadline = async {
            match window {
                Some(window) => tokio::time::sleep(window).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            admitted = admission => match admitted {
                Ok(result) => result,
                Err(_) => Err(error::canceled("queue dropped the request")),
            },
            () = token.cancelled() => Err(cancel_error(token)),
            () = deadline => {
                self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                let window = window.unwrap_or_default();
                tracing::debug!(
                    target: "reqflow::queue",
                    request_id = %options.id,
                    window_ms = window.as_millis() as u64,
                    "queue timeout"
                );
                Err(error::queue_timeout(window))
            }
        }
    }

    /// Promote queued items that have waited past the boost interval.
    ///
    /// Runs automatically before every admission; returns how many items
    /// changed tier.
    pub fn boost_now(&self) -> usize {
        let mut state = self.lock();
        self.boost_locked(&mut state)
    }

    fn boost_locked(&self, state: &mut QueueState) -> usize {
        let Some(interval) = self.config.boost_interval else {
            return 0;
        };
        if interval.is_zero() {
            return 0;
        }

        let now = Instant::now();
        let moves: Vec<((Priority, u64), Priority)> = state
            .queued
            .iter()
            .filter_map(|(&(current, seq), item)| {
                let waited = now.saturating_duration_since(item.enqueued_at);
                let tiers = u32::try_from(waited.as_millis() / interval.as_millis().max(1))
                    .unwrap_or(u32::MAX);
                let target = item.base_priority.boosted(tiers);
                (target < current).then_some(((current, seq), target))
            })
            .collect();

        for ((current, seq), target) in &moves {
            if let Some(item) = state.queued.remove(&(*current, *seq)) {
                tracing::trace!(
                    target: "reqflow::queue",
                    request_id = %item.id,
                    from = %current,
                    to = %target,
                    "boosted queued request"
                );
                state.queued.insert((*target, *seq), item);
                state.positions.insert(*seq, *target);
            }
        }

        self.counters
            .boosted
            .fetch_add(moves.len() as u64, Ordering::Relaxed);
        moves.len()
    }

    fn dispatch_locked(&self, state: &mut QueueState) {
        self.boost_locked(state);

        while state.running.len() < self.config.max_concurrent {
            let Some(((_, seq), item)) = state.queued.pop_first() else {
                break;
            };
            state.positions.remove(&seq);

            if item.token.is_cancelled() {
                let _ = item.admit.send(Err(cancel_error(&item.token)));
                continue;
            }

            state.running.insert(
                seq,
                RunningItem {
                    id: item.id.clone(),
                    token: item.token.clone(),
                },
            );
            if item.admit.send(Ok(())).is_err() {
                // Waiter is gone; its slot goes to the next item.
                state.running.remove(&seq);
                continue;
            }

            self.counters.admitted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(
                target: "reqflow::queue",
                request_id = %item.id,
                waited_ms = item.enqueued_at.elapsed().as_millis() as u64,
                "admitted from queue"
            );
        }
    }

    fn release(&self, seq: u64, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Completed => &self.counters.completed,
            Outcome::Failed => &self.counters.failed,
            Outcome::Cancelled => &self.counters.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut state = self.lock();
        state.running.remove(&seq);
        self.dispatch_locked(&mut state);
    }

    fn abandon(&self, seq: u64) {
        let mut state = self.lock();
        if state.take_queued(seq).is_none() && state.running.remove(&seq).is_some() {
            // Admitted concurrently with the waiter giving up.
            self.dispatch_locked(&mut state);
        }
    }

    /// Cancel by request id, whether queued or running.
    ///
    /// A queued item is removed and its caller rejected without the work ever
    /// starting; a running item has its token fired. Returns `false` when no
    /// live item carries `id`.
    pub fn cancel(&self, id: &str, reason: &str) -> bool {
        let mut state = self.lock();

        let queued: Vec<u64> = state
            .queued
            .iter()
            .filter(|(_, item)| item.id == id)
            .map(|(&(_, seq), _)| seq)
            .collect();
        let mut hit = false;
        for seq in queued {
            if let Some(item) = state.take_queued(seq) {
                item.token.cancel(reason);
                let _ = item.admit.send(Err(error::canceled(reason)));
                hit = true;
            }
        }

        let running: Vec<CancelToken> = state
            .running
            .values()
            .filter(|item| item.id == id)
            .map(|item| item.token.clone())
            .collect();
        drop(state);

        for token in running {
            hit |= token.cancel(reason);
        }
        hit
    }

    /// Cancel everything queued and running. Returns the number of items signalled.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let mut state = self.lock();
        let queued = std::mem::take(&mut state.queued);
        state.positions.clear();
        let running: Vec<CancelToken> =
            state.running.values().map(|item| item.token.clone()).collect();
        drop(state);

        let mut count = 0;
        for (_, item) in queued {
            item.token.cancel(reason);
            let _ = item.admit.send(Err(error::canceled(reason)));
            count += 1;
        }
        for token in running {
            if token.cancel(reason) {
                count += 1;
            }
        }

        tracing::debug!(target: "reqflow::queue", count, reason, "cancelled all items");
        count
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.lock().queued.len()
    }

    #[must_use]
    pub fn running_len(&self) -> usize {
        self.lock().running.len()
    }

    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let state = self.lock();
        let mut queued_by_priority = [0usize; 5];
        for (priority, _) in state.queued.keys() {
            queued_by_priority[usize::from(priority.value())] += 1;
        }

        QueueStatus {
            queued: state.queued.len(),
            running: state.running.len(),
            max_concurrent: self.config.max_concurrent,
            max_queue_size: self.config.max_queue_size,
            queued_by_priority,
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            boosted: self.counters.boosted.load(Ordering::Relaxed),
        }
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

fn cancel_error(token: &CancelToken) -> Error {
    error::canceled(token.reason().unwrap_or_else(|| "cancelled".to_string()))
}

/// Removes a waiting item if its waiter gives up before admission.
struct PendingGuard<'a> {
    queue: &'a PriorityQueue,
    seq: u64,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.abandon(self.seq);
        }
    }
}

/// Holds a running slot; releasing it admits the next queued item.
struct SlotGuard<'a> {
    queue: &'a PriorityQueue,
    seq: u64,
    outcome: Outcome,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.queue.release(self.seq, &self.outcome);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use super::*;

    fn queue(max_concurrent: usize, max_queue_size: usize) -> Arc<PriorityQueue> {
        Arc::new(PriorityQueue::new(QueueConfig {
            max_concurrent,
            max_queue_size,
            boost_interval: None,
            default_queue_timeout: None,
        }))
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    /// Occupy one running slot until the returned sender is dropped.
    async fn occupy(queue: &Arc<PriorityQueue>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel::<()>();
        let queue = Arc::clone(queue);
        tokio::spawn(async move {
            queue
                .enqueue(EnqueueOptions::new("blocker", Priority::Normal), async move {
                    let _ = rx.await;
                    Ok::<_, Error>(())
                })
                .await
        });
        settle().await;
        tx
    }

    #[tokio::test]
    async fn admits_by_priority_then_arrival() {
        let queue = queue(1, 10);
        let blocker = occupy(&queue).await;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for priority in [Priority::Low, Priority::Critical, Priority::Normal] {
            let queue = Arc::clone(&queue);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(EnqueueOptions::new(priority.to_string(), priority), async move {
                        order.lock().expect("order lock").push(priority);
                        Ok::<_, Error>(())
                    })
                    .await
            }));
            settle().await;
        }
        assert_eq!(queue.queued_len(), 3);

        drop(blocker);
        for handle in handles {
            handle.await.expect("task").expect("completed");
        }
        assert_eq!(
            *order.lock().expect("order lock"),
            vec![Priority::Critical, Priority::Normal, Priority::Low]
        );
        assert_eq!(queue.status().completed, 4);
    }

    #[tokio::test]
    async fn rejects_when_queue_is_full() {
        let queue = queue(1, 1);
        let _blocker = occupy(&queue).await;

        let waiting = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .enqueue(EnqueueOptions::new("second", Priority::Normal), async { Ok::<_, Error>(()) })
                    .await
            })
        };
        settle().await;

        let err = queue
            .enqueue(EnqueueOptions::new("third", Priority::Critical), async { Ok::<_, Error>(()) })
            .await
            .expect_err("full");
        assert!(err.is_queue_full());
        assert_eq!(queue.status().rejected, 1);
        waiting.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn queue_timeout_never_starts_the_work() {
        let queue = queue(1, 10);
        let _blocker = occupy(&queue).await;
        let started = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&started);
        let err = queue
            .enqueue(
                EnqueueOptions::new("late", Priority::Normal).queue_timeout(Duration::from_millis(100)),
                async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok::<_, Error>(())
                },
            )
            .await
            .expect_err("timed out");

        assert!(err.is_queue_timeout());
        assert!(!started.load(Ordering::SeqCst));
        assert_eq!(queue.queued_len(), 0);
        assert_eq!(queue.status().timed_out, 1);
    }

    #[tokio::test]
    async fn cancelling_a_queued_item_rejects_it() {
        let queue = queue(1, 10);
        let _blocker = occupy(&queue).await;
        let started = Arc::new(AtomicBool::new(false));

        let waiting = {
            let queue = Arc::clone(&queue);
            let flag = Arc::clone(&started);
            tokio::spawn(async move {
                queue
                    .enqueue(EnqueueOptions::new("doomed", Priority::Low), async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok::<_, Error>(())
                    })
                    .await
            })
        };
        settle().await;

        assert!(queue.cancel("doomed", "user abort"));
        let err = waiting.await.expect("task").expect_err("cancelled");
        assert!(err.is_cancel_error());
        assert!(!started.load(Ordering::SeqCst));
        assert!(!queue.cancel("doomed", "again"));
    }

    #[tokio::test]
    async fn cancelling_a_running_item_fires_its_token() {
        let queue = queue(2, 10);
        let running = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .enqueue(EnqueueOptions::new("slow", Priority::Normal), async {
                        std::future::pending::<()>().await;
                        Ok::<_, Error>(())
                    })
                    .await
            })
        };
        settle().await;
        assert_eq!(queue.running_len(), 1);

        assert!(queue.cancel("slow", "stop"));
        let err = running.await.expect("task").expect_err("cancelled");
        assert!(err.is_cancel_error());
        assert_eq!(queue.running_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn long_waiters_are_boosted() {
        let queue = Arc::new(PriorityQueue::new(QueueConfig {
            max_concurrent: 1,
            max_queue_size: 10,
            boost_interval: Some(Duration::from_secs(1)),
            default_queue_timeout: None,
        }));
        let _blocker = occupy(&queue).await;

        let waiting = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .enqueue(EnqueueOptions::new("patient", Priority::Low), async { Ok::<_, Error>(()) })
                    .await
            })
        };
        settle().await;
        assert_eq!(queue.status().queued_by_priority[usize::from(Priority::Low.value())], 1);

        tokio::time::advance(Duration::from_millis(2500)).await;
        assert_eq!(queue.boost_now(), 1);

        let status = queue.status();
        assert_eq!(status.queued_by_priority[usize::from(Priority::High.value())], 1);
        assert_eq!(status.boosted, 1);
        waiting.abort();
    }
}
