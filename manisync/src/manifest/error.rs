//! Error types for manifest parsing.

use thiserror::Error;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors that can occur while parsing a manifest document.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not valid JSON.
    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed, but its root is not a JSON object.
    #[error("manifest root is not a JSON object")]
    NotAnObject,

    /// A file-tree document has no `files` object.
    #[error("manifest has no `files` object")]
    MissingFiles,
}
