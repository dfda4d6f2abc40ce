// Outbound HTTP client

use crate::error::{Error, Result};
use azura_log::debug;
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use std::time::Duration;

/// Connect and overall request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared outbound client. Non-2xx responses are returned, not raised.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("azura/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { inner, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Start a request to customise before [`HttpClient::send`].
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.inner.request(method, url)
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(self.request(Method::GET, url)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        self.send(self.request(Method::POST, url).json(body)).await
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request
            .build()
            .map_err(|e| Error::Http(format!("Invalid request: {}", e)))?;
        let method = request.method().clone();
        let uri = request.url().to_string();

        let response = self
            .inner
            .execute(request)
            .await
            .map_err(|e| Error::Http(format!("{} {} failed: {}", method, uri, e)))?;

        debug!(
            "HTTP client {} call to {} produced response {}",
            method,
            uri,
            response.status().as_u16()
        );
        Ok(response)
    }
}
