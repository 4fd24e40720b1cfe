use async_trait::async_trait;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::http::{RequestConfig, ResponseData};

/// Performs one network attempt.
///
/// `config` is already normalized: `url` is absolute and carries the query
/// string, and default headers are merged. Any status the server answers with
/// is returned as `Ok`; the executor decides which statuses are failures.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the adapter can run in the current environment.
    fn is_supported(&self) -> bool {
        true
    }

    async fn request(&self, config: &RequestConfig, token: &CancelToken) -> Result<ResponseData, Error>;
}
