use std::sync::Arc;

use dashmap::DashMap;

use super::{HyperAdapter, TransportAdapter};
use crate::error::{self, Error};

/// Adapters keyed by name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Arc<DashMap<String, Arc<dyn TransportAdapter>>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in hyper adapter.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(HyperAdapter::new()));
        registry
    }

    /// Register under the adapter's own name, replacing any previous one.
    pub fn register(&self, adapter: Arc<dyn TransportAdapter>) -> Option<Arc<dyn TransportAdapter>> {
        let name = adapter.name().to_string();
        tracing::debug!(target: "reqflow::transport", adapter = %name, "adapter registered");
        self.adapters.insert(name, adapter)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn TransportAdapter>> {
        self.adapters.remove(name).map(|(_, adapter)| adapter)
    }

    /// Adapter named `name`, if registered and supported here.
    pub fn get(&self, name: &str) -> Result<Arc<dyn TransportAdapter>, Error> {
        let adapter = self
            .adapters
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| error::builder(format!("no transport adapter named '{name}'")))?;

        if !adapter.is_supported() {
            return Err(error::builder(format!(
                "transport adapter '{name}' is not supported in this environment"
            )));
        }
        Ok(adapter)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry").field("adapters", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, StatusCode};

    use super::*;
    use crate::cancel::CancelToken;
    use crate::http::{RequestConfig, ResponseData};
    use crate::transport::FnAdapter;

    #[test]
    fn unknown_adapter_is_a_builder_error() {
        let registry = AdapterRegistry::new();
        let err = registry.get("carrier-pigeon").err().expect("missing");
        assert!(err.is_builder());
    }

    #[tokio::test]
    async fn registered_adapter_is_returned_by_name() {
        let registry = AdapterRegistry::with_defaults();
        registry.register(Arc::new(FnAdapter::new(
            "mock",
            |_config: RequestConfig, _token: CancelToken| async {
                Ok::<_, Error>(ResponseData::new(StatusCode::NO_CONTENT, HeaderMap::new(), ""))
            },
        )));
        assert_eq!(registry.names(), vec!["hyper".to_string(), "mock".to_string()]);

        let adapter = registry.get("mock").expect("registered");
        let response = adapter
            .request(&RequestConfig::get("http://h.test/"), &CancelToken::new())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
