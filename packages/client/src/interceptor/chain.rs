use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::handlers::{ErrorInterceptor, RequestInterceptor, ResponseInterceptor};
use crate::error::Error;
use crate::http::{RequestConfig, ResponseData};

/// Opaque handle returned on registration, used to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

impl fmt::Display for InterceptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interceptor#{}", self.0)
    }
}

type Registry<T> = RwLock<Vec<(InterceptorId, Arc<T>)>>;

fn snapshot<T: ?Sized>(registry: &Registry<T>) -> Vec<Arc<T>> {
    let handlers = match registry.read() {
        Ok(handlers) => handlers,
        Err(poisoned) => poisoned.into_inner(),
    };
    handlers.iter().map(|(_, handler)| Arc::clone(handler)).collect()
}

fn remove_from<T: ?Sized>(registry: &Registry<T>, id: InterceptorId) -> bool {
    let mut handlers = match registry.write() {
        Ok(handlers) => handlers,
        Err(poisoned) => poisoned.into_inner(),
    };
    let before = handlers.len();
    handlers.retain(|(existing, _)| *existing != id);
    handlers.len() != before
}

/// Ordered interceptor lists for every phase.
///
/// Handlers are snapshotted before a chain runs, so registering or removing
/// handlers concurrently never affects a chain already in progress.
#[derive(Default)]
pub struct InterceptorManager {
    next_id: AtomicU64,
    request: Registry<dyn RequestInterceptor>,
    response: Registry<dyn ResponseInterceptor>,
    error: Registry<dyn ErrorInterceptor>,
}

impl InterceptorManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> InterceptorId {
        InterceptorId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_request<I: RequestInterceptor + 'static>(&self, interceptor: I) -> InterceptorId {
        let id = self.next();
        let handler: Arc<dyn RequestInterceptor> = Arc::new(interceptor);
        match self.request.write() {
            Ok(mut handlers) => handlers.push((id, handler)),
            Err(poisoned) => poisoned.into_inner().push((id, handler)),
        }
        id
    }

    pub fn add_response<I: ResponseInterceptor + 'static>(&self, interceptor: I) -> InterceptorId {
        let id = self.next();
        let handler: Arc<dyn ResponseInterceptor> = Arc::new(interceptor);
        match self.response.write() {
            Ok(mut handlers) => handlers.push((id, handler)),
            Err(poisoned) => poisoned.into_inner().push((id, handler)),
        }
        id
    }

    pub fn add_error<I: ErrorInterceptor + 'static>(&self, interceptor: I) -> InterceptorId {
        let id = self.next();
        let handler: Arc<dyn ErrorInterceptor> = Arc::new(interceptor);
        match self.error.write() {
            Ok(mut handlers) => handlers.push((id, handler)),
            Err(poisoned) => poisoned.into_inner().push((id, handler)),
        }
        id
    }

    /// Remove a handler from whichever phase holds it.
    pub fn remove(&self, id: InterceptorId) -> bool {
        remove_from(&self.request, id) || remove_from(&self.response, id) || remove_from(&self.error, id)
    }

    /// Remove every handler.
    pub fn clear(&self) {
        let removed = clear_registry(&self.request) + clear_registry(&self.response) + clear_registry(&self.error);
        tracing::trace!(target: "reqflow::interceptor", removed, "cleared interceptors");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        snapshot(&self.request).len() + snapshot(&self.response).len() + snapshot(&self.error).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn process_request(&self, config: RequestConfig) -> Result<RequestConfig, Error> {
        let mut value = Ok(config);
        for handler in snapshot(&self.request) {
            value = match value {
                Ok(config) => handler.on_request(config).await,
                Err(error) => handler.on_request_error(error).await,
            };
        }
        value
    }

    pub async fn process_response(&self, response: ResponseData) -> Result<ResponseData, Error> {
        let mut value = Ok(response);
        for handler in snapshot(&self.response) {
            value = match value {
                Ok(response) => handler.on_response(response).await,
                Err(error) => handler.on_response_error(error).await,
            };
        }
        value
    }

    /// Run the error chain. Once a handler recovers, later handlers are skipped.
    pub async fn process_error(&self, error: Error) -> Result<ResponseData, Error> {
        let mut error = error;
        for handler in snapshot(&self.error) {
            match handler.on_error(error).await {
                Ok(response) => {
                    tracing::debug!(target: "reqflow::interceptor", "error interceptor recovered with a response");
                    return Ok(response);
                }
                Err(next) => error = next,
            }
        }
        Err(error)
    }
}

fn clear_registry<T: ?Sized>(registry: &Registry<T>) -> usize {
    let mut handlers = match registry.write() {
        Ok(handlers) => handlers,
        Err(poisoned) => poisoned.into_inner(),
    };
    let removed = handlers.len();
    handlers.clear();
    removed
}

impl fmt::Debug for InterceptorManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorManager")
            .field("request", &snapshot(&self.request).len())
            .field("response", &snapshot(&self.response).len())
            .field("error", &snapshot(&self.error).len())
            .finish()
    }
}
