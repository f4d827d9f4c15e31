//! CLI error types.

use std::io;

use manisync::{ConfigError, SyncError};
use thiserror::Error;

/// Errors surfaced to the user by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or saved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A config file already exists and `--force` was not given.
    #[error("config file already exists at {0} (use --force to overwrite)")]
    ConfigExists(String),

    /// Logging could not be initialized.
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    /// The Ctrl+C handler could not be installed.
    #[error("failed to set signal handler: {0}")]
    Signal(String),

    /// A run could not be started.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The run finished unsuccessfully.
    #[error("synchronization failed: {0}")]
    RunFailed(String),

    /// The run was interrupted by the user.
    #[error("interrupted")]
    Interrupted,

    /// Writing to the terminal failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Interrupted.exit_code(), 130);
        assert_eq!(CliError::RunFailed("x".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_display() {
        let err = CliError::ConfigExists("/tmp/config.ini".to_string());
        assert!(err.to_string().contains("--force"));
    }
}
