//! Terminal methods
//!
//! Each terminal sets the HTTP method and URL and runs the request through the
//! executor. Bodyless methods live on `BodyNotSet`, body-carrying ones on
//! `BodySet`.

use http::Method;
use reqflow_client::error::{self, Error};
use reqflow_client::prelude::ResponseData;
use serde::de::DeserializeOwned;

use crate::builder::core::{BodyNotSet, BodySet, RequestBuilder};

impl RequestBuilder<BodyNotSet> {
    pub async fn get(self, url: &str) -> Result<ResponseData, Error> {
        self.dispatch(Method::GET, url).await
    }

    /// GET and decode the JSON payload.
    pub async fn get_json<T: DeserializeOwned>(self, url: &str) -> Result<T, Error> {
        decode(self.get(url).await?)
    }

    pub async fn delete(self, url: &str) -> Result<ResponseData, Error> {
        self.dispatch(Method::DELETE, url).await
    }

    pub async fn head(self, url: &str) -> Result<ResponseData, Error> {
        self.dispatch(Method::HEAD, url).await
    }

    pub async fn options(self, url: &str) -> Result<ResponseData, Error> {
        self.dispatch(Method::OPTIONS, url).await
    }
}

impl RequestBuilder<BodySet> {
    pub async fn post(self, url: &str) -> Result<ResponseData, Error> {
        self.dispatch(Method::POST, url).await
    }

    /// POST and decode the JSON payload.
    pub async fn post_json<T: DeserializeOwned>(self, url: &str) -> Result<T, Error> {
        decode(self.post(url).await?)
    }

    pub async fn put(self, url: &str) -> Result<ResponseData, Error> {
        self.dispatch(Method::PUT, url).await
    }

    pub async fn patch(self, url: &str) -> Result<ResponseData, Error> {
        self.dispatch(Method::PATCH, url).await
    }
}

fn decode<T: DeserializeOwned>(response: ResponseData) -> Result<T, Error> {
    serde_json::from_slice(response.data()).map_err(error::decode)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use http::{HeaderMap, StatusCode};
    use reqflow_client::prelude::{CancelToken, ClientConfig, FnAdapter, RequestConfig, RequestExecutor};
    use serde::{Deserialize, Serialize};

    use crate::RequestBuilder;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
    }

    fn echo_client(seen: Arc<Mutex<Vec<RequestConfig>>>) -> RequestExecutor {
        let adapter = FnAdapter::new("echo", move |config: RequestConfig, _token: CancelToken| {
            let seen = Arc::clone(&seen);
            async move {
                let body = config.body.clone().unwrap_or_default();
                seen.lock().expect("seen lock").push(config);
                Ok::<_, reqflow_client::Error>(reqflow_client::ResponseData::new(
                    StatusCode::OK,
                    HeaderMap::new(),
                    body,
                ))
            }
        });
        RequestExecutor::with_adapter(
            ClientConfig::new().with_base_url("http://api.test").without_cache(),
            Arc::new(adapter),
        )
        .expect("valid config")
    }

    #[tokio::test]
    async fn json_body_round_trips_through_the_executor() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = echo_client(Arc::clone(&seen));

        let widget: Widget = RequestBuilder::json(&client)
            .bearer_auth("secret")
            .body(&Widget { name: "gear".to_string() })
            .post_json("/widgets")
            .await
            .expect("echoed");
        assert_eq!(widget.name, "gear");

        let sent = seen.lock().expect("seen lock");
        assert_eq!(sent[0].method, http::Method::POST);
        assert_eq!(sent[0].url, "http://api.test/widgets");
        assert_eq!(sent[0].headers[http::header::AUTHORIZATION], "Bearer secret");
        assert_eq!(sent[0].headers[http::header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn form_body_is_urlencoded() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = echo_client(Arc::clone(&seen));

        let response = RequestBuilder::form_urlencoded(&client)
            .body(&[("q", "rust lang")])
            .post("/search")
            .await
            .expect("echoed");
        assert_eq!(&response.data()[..], b"q=rust+lang");
    }

    #[tokio::test]
    async fn invalid_header_fails_when_sent() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let client = echo_client(Arc::clone(&seen));

        let err = RequestBuilder::new(&client)
            .header_str("bad header", "x")
            .get("/")
            .await
            .expect_err("invalid");
        assert!(err.is_builder());
        assert!(seen.lock().expect("seen lock").is_empty());
    }
}
