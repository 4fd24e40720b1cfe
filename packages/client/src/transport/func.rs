use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use super::TransportAdapter;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::http::{RequestConfig, ResponseData};

/// Adapter backed by an async closure, for custom integrations and tests.
pub struct FnAdapter<F> {
    name: String,
    handler: F,
}

impl<F, Fut> FnAdapter<F>
where
    F: Fn(RequestConfig, CancelToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseData, Error>> + Send,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> fmt::Debug for FnAdapter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAdapter").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> TransportAdapter for FnAdapter<F>
where
    F: Fn(RequestConfig, CancelToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseData, Error>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn request(&self, config: &RequestConfig, token: &CancelToken) -> Result<ResponseData, Error> {
        (self.handler)(config.clone(), token.clone()).await
    }
}
