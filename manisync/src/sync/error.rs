//! Error types for synchronization runs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::manifest::ManifestError;
use crate::pool::{FetchError, PoolError};

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while starting or running a synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run on the same synchronizer has not finished yet.
    #[error("a synchronization run is already in progress")]
    RunInProgress,

    /// Work could not be submitted to the fetch pool.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A manifest document could not be parsed.
    #[error("invalid manifest from {source_name}: {source}")]
    Manifest {
        source_name: String,
        #[source]
        source: ManifestError,
    },

    /// A local file could not be verified or evicted.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A blocking helper task did not complete.
    #[error("background task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn manifest(source_name: impl Into<String>, source: ManifestError) -> Self {
        Self::Manifest {
            source_name: source_name.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            SyncError::RunInProgress.to_string(),
            "a synchronization run is already in progress"
        );

        let err = SyncError::from(FetchError::Status {
            url: "https://example.com/m.json".to_string(),
            status: 503,
        });
        assert_eq!(err.to_string(), "HTTP 503 from https://example.com/m.json");

        let err = SyncError::manifest("client", ManifestError::MissingFiles);
        assert!(err.to_string().starts_with("invalid manifest from client"));
    }

    #[test]
    fn test_pool_error_converts() {
        let err: SyncError = PoolError::ShutDown.into();
        assert!(matches!(err, SyncError::Pool(PoolError::ShutDown)));
    }
}
