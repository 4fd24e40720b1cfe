/// A marker type to indicate that a request deadline elapsed.
#[derive(Debug, thiserror::Error)]
#[error("timed out after {0:?}")]
pub struct TimedOut(pub std::time::Duration);

/// A marker type to indicate that an operation was canceled.
#[derive(Debug, thiserror::Error)]
#[error("operation canceled: {reason}")]
pub struct OperationCanceled {
    pub reason: String,
}

/// The scheduler queue is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("queue is full ({capacity} items)")]
pub struct QueueFull {
    pub capacity: usize,
}

/// The item waited longer than its admission window.
#[derive(Debug, thiserror::Error)]
#[error("not admitted within {0:?}")]
pub struct QueueTimedOut(pub std::time::Duration);

/// The pool could not produce a connection.
#[derive(Debug, thiserror::Error)]
#[error("no connection available for {host}: {reason}")]
pub struct PoolUnavailable {
    pub host: String,
    pub reason: String,
}
