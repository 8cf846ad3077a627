//! HTTP client abstraction for testability

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::FeedError;
use crate::config::DEFAULT_FEED_TIMEOUT;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// Resolves to the response body, or an error for transport failures and
    /// non-2xx statuses.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FeedError>>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new ReqwestClient with the default timeout.
    pub fn new() -> Result<Self, FeedError> {
        Self::with_timeout(DEFAULT_FEED_TIMEOUT)
    }

    /// Creates a new ReqwestClient with custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("transitlive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FeedError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| FeedError::Http(format!("Request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FeedError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| FeedError::Http(format!("Failed to read response: {}", e)))
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock HTTP client for testing.
    ///
    /// Replays queued responses in order; the last one repeats forever.
    pub struct MockHttpClient {
        responses: Mutex<VecDeque<Result<Vec<u8>, FeedError>>>,
        calls: AtomicUsize,
    }

    impl MockHttpClient {
        pub fn new(responses: Vec<Result<Vec<u8>, FeedError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_body(body: Vec<u8>) -> Self {
            Self::new(vec![Ok(body)])
        }

        pub fn with_error(error: FeedError) -> Self {
            Self::new(vec![Err(error)])
        }

        /// Number of requests made.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl HttpClient for MockHttpClient {
        fn get<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FeedError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            let response = if responses.len() > 1 {
                responses.pop_front()
            } else {
                responses.front().cloned()
            };
            let response =
                response.unwrap_or_else(|| Err(FeedError::Http("no mock response".to_string())));
            Box::pin(async move { response })
        }
    }

    #[tokio::test]
    async fn test_mock_client_replays_in_order() {
        let mock = MockHttpClient::new(vec![
            Ok(vec![1, 2, 3]),
            Err(FeedError::Http("Test error".to_string())),
        ]);

        assert_eq!(mock.get("http://example.com").await, Ok(vec![1, 2, 3]));
        assert!(mock.get("http://example.com").await.is_err());
        assert!(mock.get("http://example.com").await.is_err());
        assert_eq!(mock.calls(), 3);
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::with_timeout(Duration::from_secs(1)).is_ok());
    }
}
