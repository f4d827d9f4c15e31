//! Error types for the fetch pool.

use thiserror::Error;

/// Errors returned when work cannot be submitted to the pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool no longer accepts work (after a graceful or forced shutdown).
    #[error("fetch pool is shut down")]
    ShutDown,

    /// The worker runtime could not be created.
    #[error("failed to start fetch pool runtime: {0}")]
    Runtime(String),

    /// A helper thread could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Thread(String),

    /// The default HTTP fetcher could not be created.
    #[error("failed to create fetcher: {0}")]
    Fetcher(#[from] FetchError),
}

/// Errors from a single fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// The request failed before a response was received.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request exceeded the configured timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The fetch was abandoned by a forced shutdown.
    #[error("fetch of {url} was cancelled")]
    Cancelled { url: String },

    /// A blocking wait was attempted from inside an async runtime.
    #[error("blocking wait for {url} from an async context")]
    BlockingInRuntime { url: String },
}

impl FetchError {
    /// URL the failed fetch targeted, if known.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Client(_) => None,
            Self::Request { url, .. }
            | Self::Status { url, .. }
            | Self::Timeout { url, .. }
            | Self::Cancelled { url }
            | Self::BlockingInRuntime { url } => Some(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Status {
            url: "https://example.com/a".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "HTTP 404 from https://example.com/a");
        assert_eq!(err.url(), Some("https://example.com/a"));
    }

    #[test]
    fn test_client_error_has_no_url() {
        let err = FetchError::Client("tls".to_string());
        assert_eq!(err.url(), None);
    }

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::ShutDown.to_string(), "fetch pool is shut down");
    }
}
