use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use super::TransportAdapter;
use crate::cancel::CancelToken;
use crate::error::{self, Error};
use crate::http::{RequestConfig, ResponseData};

const NAME: &str = "hyper";

/// Plain-HTTP adapter over the hyper-util legacy client.
#[derive(Clone)]
pub struct HyperAdapter {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperAdapter {
    #[must_use]
    pub fn new() -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);
        connector.set_connect_timeout(Some(Duration::from_secs(10)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);
        Self { client }
    }

    fn build_request(config: &RequestConfig) -> Result<http::Request<Full<Bytes>>, Error> {
        let uri: http::Uri = config.url.parse().map_err(error::builder)?;
        let mut request = http::Request::new(Full::new(config.body.clone().unwrap_or_default()));
        *request.method_mut() = config.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = config.headers.clone();
        Ok(request)
    }
}

impl Default for HyperAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HyperAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperAdapter").finish_non_exhaustive()
    }
}

fn cancelled(token: &CancelToken) -> Error {
    error::canceled(token.reason().unwrap_or_else(|| "request cancelled".to_string()))
}

#[async_trait]
impl TransportAdapter for HyperAdapter {
    fn name(&self) -> &str {
        NAME
    }

    async fn request(&self, config: &RequestConfig, token: &CancelToken) -> Result<ResponseData, Error> {
        let request = Self::build_request(config)?;
        tracing::trace!(target: "reqflow::transport", method = %config.method, url = %config.url, "sending");

        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(cancelled(token)),
            response = self.client.request(request) => response.map_err(error::network)?,
        };

        let (parts, body) = response.into_parts();
        let body = tokio::select! {
            biased;
            () = token.cancelled() => return Err(cancelled(token)),
            body = body.collect() => body.map_err(error::network)?.to_bytes(),
        };

        let status_text = parts.status.canonical_reason().unwrap_or_default();
        Ok(ResponseData::new(parts.status, parts.headers, body)
            .with_status_text(status_text)
            .with_extensions(parts.extensions))
    }
}
