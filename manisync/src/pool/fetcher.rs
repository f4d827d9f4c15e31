//! Fetch primitive abstraction for testability.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::USER_AGENT;
use reqwest::Client;

use super::error::FetchError;

/// Boxed future returned by [`Fetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Bytes, FetchError>> + Send + 'a>>;

/// The raw transport: `fetch(url, identity) -> bytes | error`.
///
/// This abstraction allows the pool to be driven by an in-memory fetcher in
/// tests. Implementations run on pool worker threads.
pub trait Fetcher: Send + Sync + 'static {
    /// Fetches the full body of `url`, sending `identity` as the user agent.
    fn fetch<'a>(&'a self, url: &'a str, identity: &'a str) -> FetchFuture<'a>;

    /// Called when the pool installs a fresh runtime.
    ///
    /// Implementations holding runtime-bound resources (connection pools)
    /// should drop them here.
    fn reset(&self) {}
}

/// HTTP fetcher using reqwest.
pub struct ReqwestFetcher {
    client: RwLock<Client>,
    timeout: Duration,
}

impl ReqwestFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: RwLock::new(build_client(timeout)?),
            timeout,
        })
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get(&self, url: &str, identity: &str) -> Result<Bytes, FetchError> {
        let client = self.client.read().clone();

        let response = client
            .get(url)
            .header(USER_AGENT, identity)
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|e| self.map_error(url, e))
    }

    fn map_error(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl Fetcher for ReqwestFetcher {
    fn fetch<'a>(&'a self, url: &'a str, identity: &'a str) -> FetchFuture<'a> {
        Box::pin(self.get(url, identity))
    }

    fn reset(&self) {
        match build_client(self.timeout) {
            Ok(client) => *self.client.write() = client,
            Err(e) => tracing::warn!(error = %e, "Keeping previous HTTP client"),
        }
    }
}

fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Client(e.to_string()))
}
