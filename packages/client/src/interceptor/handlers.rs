use std::future::Future;

use async_trait::async_trait;

use crate::error::Error;
use crate::http::{RequestConfig, ResponseData};

/// Transforms outgoing requests before they reach the transport.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, Error>;

    /// Called when an earlier request handler failed. Returning a config
    /// resumes the chain with it.
    async fn on_request_error(&self, error: Error) -> Result<RequestConfig, Error> {
        Err(error)
    }
}

/// Transforms successful responses.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn on_response(&self, response: ResponseData) -> Result<ResponseData, Error>;

    async fn on_response_error(&self, error: Error) -> Result<ResponseData, Error> {
        Err(error)
    }
}

/// Observes or recovers terminal failures.
#[async_trait]
pub trait ErrorInterceptor: Send + Sync {
    /// Return `Ok` to recover with a substitute response.
    async fn on_error(&self, error: Error) -> Result<ResponseData, Error>;
}

pub struct RequestFn<F>(F);

#[async_trait]
impl<F, Fut> RequestInterceptor for RequestFn<F>
where
    F: Fn(RequestConfig) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RequestConfig, Error>> + Send,
{
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, Error> {
        (self.0)(config).await
    }
}

pub struct ResponseFn<F>(F);

#[async_trait]
impl<F, Fut> ResponseInterceptor for ResponseFn<F>
where
    F: Fn(ResponseData) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseData, Error>> + Send,
{
    async fn on_response(&self, response: ResponseData) -> Result<ResponseData, Error> {
        (self.0)(response).await
    }
}

pub struct ErrorFn<F>(F);

#[async_trait]
impl<F, Fut> ErrorInterceptor for ErrorFn<F>
where
    F: Fn(Error) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseData, Error>> + Send,
{
    async fn on_error(&self, error: Error) -> Result<ResponseData, Error> {
        (self.0)(error).await
    }
}

/// Request interceptor backed by an async closure.
pub fn request_fn<F, Fut>(f: F) -> RequestFn<F>
where
    F: Fn(RequestConfig) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RequestConfig, Error>> + Send,
{
    RequestFn(f)
}

pub fn response_fn<F, Fut>(f: F) -> ResponseFn<F>
where
    F: Fn(ResponseData) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseData, Error>> + Send,
{
    ResponseFn(f)
}

pub fn error_fn<F, Fut>(f: F) -> ErrorFn<F>
where
    F: Fn(Error) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ResponseData, Error>> + Send,
{
    ErrorFn(f)
}
