//! Cancellation token with listeners and linked parents

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

type Listener = Box<dyn FnOnce(&str) + Send>;

/// A cloneable cancellation signal.
///
/// All clones observe the same state. Cancellation is one-shot: the first
/// `cancel` wins and later calls are no-ops. A token built with
/// [`CancelToken::any_of`] fires as soon as any of its parents fires.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
    listeners: Mutex<Vec<Listener>>,
    parents: Vec<CancelToken>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a token that is cancelled when any of `parents` is cancelled.
    ///
    /// The composite can still be cancelled on its own without affecting the
    /// parents. If a parent is already cancelled the composite starts cancelled.
    #[must_use]
    pub fn any_of(parents: &[CancelToken]) -> Self {
        let token = Self {
            inner: Arc::new(TokenInner {
                parents: parents.to_vec(),
                ..TokenInner::default()
            }),
        };

        for parent in parents {
            let weak: Weak<TokenInner> = Arc::downgrade(&token.inner);
            parent.on_cancel(move |reason| {
                if let Some(inner) = weak.upgrade() {
                    CancelToken { inner }.cancel(reason);
                }
            });
        }

        token
    }

    /// Derive a token that follows this one but can be cancelled independently.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::any_of(std::slice::from_ref(self))
    }

    /// Cancel the token. Returns `true` if this call performed the cancellation.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        {
            let mut slot = match self.inner.reason.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason.clone());
            self.inner.cancelled.store(true, Ordering::Release);
        }

        self.inner.notify.notify_waiters();

        let listeners = {
            let mut listeners = match self.inner.listeners.lock() {
                Ok(listeners) => listeners,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *listeners)
        };
        for listener in listeners {
            listener(&reason);
        }

        true
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The reason passed to the winning `cancel` call.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        match self.inner.reason.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub fn parents(&self) -> &[CancelToken] {
        &self.inner.parents
    }

    /// Run `listener` once when the token is cancelled.
    ///
    /// Runs immediately on the calling thread if the token is already cancelled.
    pub fn on_cancel<F>(&self, listener: F)
    where
        F: FnOnce(&str) + Send + 'static,
    {
        {
            let mut listeners = match self.inner.listeners.lock() {
                Ok(listeners) => listeners,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !self.is_cancelled() {
                listeners.push(Box::new(listener));
                return;
            }
        }
        listener(&self.reason().unwrap_or_default());
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .field("parents", &self.inner.parents.len())
            .finish()
    }
}
