//! SHA-1 content hashing for local artifact verification.
//!
//! Manifests identify every artifact by the SHA-1 of its contents. Before a
//! file (or a cached sub-manifest) is fetched again, its local copy is hashed
//! and compared against the manifest hash; only stale or missing artifacts
//! are transferred.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use thiserror::Error;

/// Buffer size for reading files during hashing (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Errors that can occur while hashing or evicting local artifacts.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// Failed to read the file being hashed.
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: PathBuf, source: io::Error },

    /// A stale file could not be removed before re-downloading it.
    #[error("failed to delete stale file {path}: {source}")]
    EvictFailed { path: PathBuf, source: io::Error },
}

/// Result of checking a local artifact against its expected hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    /// The file exists and its hash matches.
    Valid,
    /// No file exists at the path.
    Missing,
    /// The file existed with a different hash and has been deleted.
    Evicted { actual: String },
}

impl LocalState {
    /// Returns true if the local copy can be used as-is.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Calculate the SHA-1 of a file.
///
/// Returns the lowercase hexadecimal digest of the file contents.
pub fn sha1_file(path: &Path) -> Result<String, ChecksumError> {
    let mut file = File::open(path).map_err(|e| ChecksumError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ChecksumError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Calculate the SHA-1 of an in-memory buffer.
pub fn sha1_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha1::digest(data))
}

/// Compare two hex digests, ignoring ASCII case.
pub fn hashes_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Check a local artifact and delete it when it is stale.
///
/// A file whose hash cannot be computed (unreadable) is treated as stale.
/// Failing to delete a stale file is reported as [`ChecksumError::EvictFailed`].
pub fn verify_or_evict(path: &Path, expected: &str) -> Result<LocalState, ChecksumError> {
    if !path.is_file() {
        return Ok(LocalState::Missing);
    }

    let actual = match sha1_file(path) {
        Ok(actual) if hashes_match(expected, &actual) => return Ok(LocalState::Valid),
        Ok(actual) => actual,
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable local file treated as stale");
            String::new()
        }
    };

    tracing::debug!(
        path = %path.display(),
        expected,
        actual = %actual,
        "Local hash mismatch, file will be downloaded again"
    );

    fs::remove_file(path).map_err(|e| ChecksumError::EvictFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(LocalState::Evicted { actual })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// SHA-1 of "hello world".
    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    #[test]
    fn test_sha1_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();

        assert_eq!(sha1_file(&file_path).unwrap(), HELLO_SHA1);
    }

    #[test]
    fn test_sha1_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.txt");
        File::create(&file_path).unwrap();

        assert_eq!(
            sha1_file(&file_path).unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn test_sha1_nonexistent_file() {
        let result = sha1_file(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(ChecksumError::ReadFailed { .. })));
    }

    #[test]
    fn test_sha1_bytes_matches_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.bin");
        let data = vec![0xABu8; 100_000];
        fs::write(&file_path, &data).unwrap();

        assert_eq!(sha1_file(&file_path).unwrap(), sha1_bytes(&data));
    }

    #[test]
    fn test_hashes_match_ignores_case() {
        assert!(hashes_match(&HELLO_SHA1.to_uppercase(), HELLO_SHA1));
        assert!(!hashes_match("abc", HELLO_SHA1));
    }

    #[test]
    fn test_verify_missing() {
        let temp = TempDir::new().unwrap();
        let state = verify_or_evict(&temp.path().join("absent"), HELLO_SHA1).unwrap();
        assert_eq!(state, LocalState::Missing);
    }

    #[test]
    fn test_verify_valid_keeps_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"hello world").unwrap();

        let state = verify_or_evict(&file_path, &HELLO_SHA1.to_uppercase()).unwrap();
        assert!(state.is_valid());
        assert!(file_path.exists());
    }

    #[test]
    fn test_verify_stale_evicts_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"outdated").unwrap();

        let state = verify_or_evict(&file_path, HELLO_SHA1).unwrap();
        assert_eq!(
            state,
            LocalState::Evicted {
                actual: sha1_bytes(b"outdated")
            }
        );
        assert!(!file_path.exists());
    }

    #[test]
    fn test_verify_directory_is_missing() {
        let temp = TempDir::new().unwrap();
        let state = verify_or_evict(temp.path(), HELLO_SHA1).unwrap();
        assert_eq!(state, LocalState::Missing);
    }
}
