use std::collections::BTreeSet;
use std::time::Duration;

use crate::queue::Priority;

/// Per-call switches for [`RequestExecutor::execute`](super::RequestExecutor::execute).
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub skip_cache: bool,
    pub skip_retry: bool,
    pub skip_dedup: bool,
    /// Id used for `cancel(id)`; generated when absent
    pub request_id: Option<String>,
    /// Overrides the request's and the client's priority
    pub priority: Option<Priority>,
    pub queue_timeout: Option<Duration>,
    /// Merged with the request's own tags
    pub tags: BTreeSet<String>,
}

impl ExecuteOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    #[must_use]
    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    #[must_use]
    pub fn skip_dedup(mut self) -> Self {
        self.skip_dedup = true;
        self
    }

    #[must_use]
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}
