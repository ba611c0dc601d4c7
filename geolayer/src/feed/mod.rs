//! Feed client abstraction.
//!
//! The feed is a GeoJSON document fetched with an unauthenticated HTTP
//! GET. The trait seam allows dependency injection: tests drive the
//! pipeline with scripted in-memory clients instead of the network.

use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors that can occur fetching the feed.
///
/// These are refresh-local: a failed fetch is logged and the
/// previously attached group stays visible.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    /// Network or HTTP-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response body could not be read.
    #[error("invalid feed body: {0}")]
    InvalidBody(String),
}

/// Async source of feed documents.
pub trait FeedClient: Send + Sync {
    /// Fetches the current feed document.
    fn fetch(&self) -> impl Future<Output = Result<Bytes, FeedError>> + Send;
}

/// Feed client backed by a reqwest HTTP client.
#[derive(Clone)]
pub struct ReqwestFeedClient {
    client: reqwest::Client,
    url: String,
}

/// User-Agent sent with feed requests. Some feed servers reject
/// requests without one.
const USER_AGENT: &str = concat!("geolayer/", env!("CARGO_PKG_VERSION"));

impl ReqwestFeedClient {
    /// Creates a client for the given feed URL.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| FeedError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Returns the configured feed URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FeedClient for ReqwestFeedClient {
    async fn fetch(&self) -> Result<Bytes, FeedError> {
        trace!(url = %self.url, "feed fetch starting");

        let response = match self.client.get(&self.url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = %self.url, error = %e, is_timeout = e.is_timeout(), "feed request failed");
                return Err(FeedError::Http(format!("request failed: {}", e)));
            }
        };

        if !response.status().is_success() {
            warn!(url = %self.url, status = response.status().as_u16(), "feed HTTP error status");
            return Err(FeedError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        match response.bytes().await {
            Ok(bytes) => {
                debug!(url = %self.url, bytes = bytes.len(), "feed fetched");
                Ok(bytes)
            }
            Err(e) => Err(FeedError::InvalidBody(format!(
                "failed to read response: {}",
                e
            ))),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Mock feed client returning a fixed response.
    #[derive(Clone)]
    pub struct MockFeedClient {
        pub response: Result<Bytes, FeedError>,
    }

    impl FeedClient for MockFeedClient {
        async fn fetch(&self) -> Result<Bytes, FeedError> {
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock = MockFeedClient {
            response: Ok(Bytes::from_static(b"{}")),
        };
        assert_eq!(mock.fetch().await.unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_mock_client_error() {
        let mock = MockFeedClient {
            response: Err(FeedError::Http("unreachable".to_string())),
        };
        assert!(mock.fetch().await.is_err());
    }

    #[test]
    fn test_client_construction() {
        let client =
            ReqwestFeedClient::new("https://example.com/feed.geojson", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.url(), "https://example.com/feed.geojson");
    }
}
