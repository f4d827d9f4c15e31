//! CLI command implementations.

pub mod config;
pub mod sync;

use manisync::{ConfigError, SyncConfig};

use crate::error::CliError;

/// Load the config file, using defaults on platforms without a config
/// directory.
pub fn load_config() -> Result<SyncConfig, CliError> {
    match SyncConfig::load() {
        Err(ConfigError::NoConfigDir) => Ok(SyncConfig::default()),
        result => Ok(result?),
    }
}
