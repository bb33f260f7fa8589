//! HTTP client trait and implementations.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::FetchError;

/// Trait for HTTP clients, enabling mockability in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch binary content from a URL.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Configuration for DownloadClient.
#[derive(Clone)]
pub struct DownloadClientBuilder {
    timeout: Duration,
    user_agent: String,
}

impl Default for DownloadClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            user_agent: format!("gfkitchen/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Build the DownloadClient.
    pub fn build(self) -> Result<DownloadClient, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()?;

        Ok(DownloadClient { inner })
    }
}

/// Production HTTP client for image downloads.
pub struct DownloadClient {
    inner: reqwest::Client,
}

impl DownloadClient {
    /// Create a new DownloadClient with default configuration.
    pub fn new() -> Result<Self, reqwest::Error> {
        DownloadClientBuilder::new().build()
    }

    /// Get a builder for custom configuration.
    pub fn builder() -> DownloadClientBuilder {
        DownloadClientBuilder::new()
    }
}

#[async_trait]
impl HttpClient for DownloadClient {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        tracing::debug!(url, "network: downloading");
        let response = self.inner.get(parsed).send().await?;

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "network: download failed");
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?.to_vec();
        tracing::debug!(url, bytes = bytes.len(), "network: downloaded");

        Ok(bytes)
    }
}

/// Mock response for testing.
#[derive(Clone)]
pub enum MockResponse {
    Bytes(Vec<u8>),
    Status(u16),
    Error(String),
}

/// Mock HTTP client for testing.
pub struct MockClient {
    responses: HashMap<String, MockResponse>,
    requests: Mutex<Vec<String>>,
}

impl MockClient {
    /// Create a new empty mock client.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Add a response for a URL.
    pub fn with_response(mut self, url: &str, response: MockResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    /// Add a bytes response for a URL.
    pub fn with_bytes(self, url: &str, bytes: Vec<u8>) -> Self {
        self.with_response(url, MockResponse::Bytes(bytes))
    }

    /// Add an HTTP status failure for a URL.
    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_response(url, MockResponse::Status(status))
    }

    /// Add an error response for a URL.
    pub fn with_error(self, url: &str, error: &str) -> Self {
        self.with_response(url, MockResponse::Error(error.to_string()))
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockClient {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        match self.responses.get(url) {
            Some(MockResponse::Bytes(bytes)) => Ok(bytes.clone()),
            Some(MockResponse::Status(status)) => Err(FetchError::Status {
                status: *status,
                url: url.to_string(),
            }),
            Some(MockResponse::Error(e)) => Err(FetchError::InvalidUrl(e.clone())),
            None => Err(FetchError::InvalidUrl(format!(
                "No mock response for URL: {}",
                url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_client_returns_configured_responses() {
        let client = MockClient::new()
            .with_bytes("https://img/ok.png", vec![1, 2, 3])
            .with_status("https://img/gone.png", 403);

        assert_eq!(client.fetch_bytes("https://img/ok.png").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            client.fetch_bytes("https://img/gone.png").await,
            Err(FetchError::Status { status: 403, .. })
        ));
        assert!(client.fetch_bytes("https://img/missing.png").await.is_err());
        assert_eq!(client.requests().len(), 3);
    }

    #[tokio::test]
    async fn download_client_rejects_invalid_url() {
        let client = DownloadClient::new().unwrap();
        assert!(matches!(
            client.fetch_bytes("not a url").await,
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
