//! Configuration for the synchronization engine.
//!
//! Settings are read from an INI file, by default
//! `~/.config/manisync/config.ini`:
//!
//! ```ini
//! [pool]
//! workers = 8
//! max_concurrent_fetches = 8
//! drain_timeout_secs = 15
//! request_timeout_secs = 300
//! identity = manisync/0.1
//!
//! [sync]
//! output_dir = /home/user/games/data
//! ```
//!
//! A missing file yields the defaults. Command-line flags override file values.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

/// Default time to wait for in-flight tasks when the pool restarts.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 15;

/// Default timeout for a single HTTP request (5 minutes).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default identity sent as the `User-Agent` header.
pub const DEFAULT_IDENTITY: &str = concat!("manisync/", env!("CARGO_PKG_VERSION"));

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "data";

const POOL_SECTION: &str = "pool";
const SYNC_SECTION: &str = "sync";

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed.
    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A value was present but not valid for its key.
    #[error("invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },

    /// The configuration file could not be written.
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No per-user configuration directory exists on this platform.
    #[error("could not determine the user configuration directory")]
    NoConfigDir,
}

/// Fetch pool settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum number of network requests in flight at once.
    pub max_concurrent_fetches: usize,
    /// How long `restart()` waits for in-flight work to drain.
    pub drain_timeout: Duration,
    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,
    /// Value of the `User-Agent` header for outbound requests.
    pub identity: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = available_parallelism();
        Self {
            workers,
            max_concurrent_fetches: workers,
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            identity: DEFAULT_IDENTITY.to_string(),
        }
    }
}

impl PoolConfig {
    /// Set the worker count; the fetch limit follows it. Minimum 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self.max_concurrent_fetches = self.workers;
        self
    }

    /// Set the drain timeout used by `restart()`.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the outbound identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Fetch pool settings.
    pub pool: PoolConfig,
    /// Directory runs write into when the caller supplies none.
    pub output_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl SyncConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("manisync").join("config.ini"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load configuration from `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_ini(&ini)
    }

    /// Build configuration from a parsed INI document.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(pool) = ini.section(Some(POOL_SECTION)) {
            if let Some(value) = pool.get("workers") {
                config.pool = config.pool.with_workers(parse_positive(value, "workers")?);
            }
            if let Some(value) = pool.get("max_concurrent_fetches") {
                config.pool.max_concurrent_fetches =
                    parse_positive(value, "max_concurrent_fetches")?;
            }
            if let Some(value) = pool.get("drain_timeout_secs") {
                config.pool.drain_timeout =
                    Duration::from_secs(parse_u64(value, "drain_timeout_secs")?);
            }
            if let Some(value) = pool.get("request_timeout_secs") {
                config.pool.request_timeout =
                    Duration::from_secs(parse_u64(value, "request_timeout_secs")?);
            }
            if let Some(value) = pool.get("identity") {
                let value = value.trim();
                if !value.is_empty() {
                    config.pool.identity = value.to_string();
                }
            }
        }

        if let Some(value) = ini
            .section(Some(SYNC_SECTION))
            .and_then(|sync| sync.get("output_dir"))
        {
            config.output_dir = PathBuf::from(value.trim());
        }

        Ok(config)
    }

    /// Serialize to an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some(POOL_SECTION))
            .set("workers", self.pool.workers.to_string())
            .set(
                "max_concurrent_fetches",
                self.pool.max_concurrent_fetches.to_string(),
            )
            .set(
                "drain_timeout_secs",
                self.pool.drain_timeout.as_secs().to_string(),
            )
            .set(
                "request_timeout_secs",
                self.pool.request_timeout.as_secs().to_string(),
            )
            .set("identity", self.pool.identity.as_str());
        ini.with_section(Some(SYNC_SECTION))
            .set("output_dir", self.output_dir.to_string_lossy().into_owned());
        ini
    }

    /// Write configuration to the default location.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }
}

/// Number of hardware threads, at least 1.
pub fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn parse_u64(value: &str, key: &'static str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            section: POOL_SECTION,
            key,
            value: value.to_string(),
        })
}

fn parse_positive(value: &str, key: &'static str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            section: POOL_SECTION,
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert!(config.pool.workers >= 1);
        assert_eq!(config.pool.max_concurrent_fetches, config.pool.workers);
        assert_eq!(config.pool.drain_timeout, Duration::from_secs(15));
        assert_eq!(config.output_dir, PathBuf::from("data"));
        assert!(config.pool.identity.starts_with("manisync/"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = SyncConfig::load_from(&temp.path().join("config.ini")).unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn test_from_ini_overrides() {
        let ini = Ini::load_from_str(
            "[pool]\nworkers = 3\ndrain_timeout_secs = 2\nidentity = test-agent\n\
             [sync]\noutput_dir = /tmp/out\n",
        )
        .unwrap();

        let config = SyncConfig::from_ini(&ini).unwrap();
        assert_eq!(config.pool.workers, 3);
        assert_eq!(config.pool.max_concurrent_fetches, 3);
        assert_eq!(config.pool.drain_timeout, Duration::from_secs(2));
        assert_eq!(config.pool.identity, "test-agent");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_invalid_workers_rejected() {
        let ini = Ini::load_from_str("[pool]\nworkers = zero\n").unwrap();
        let err = SyncConfig::from_ini(&ini).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "workers", .. }
        ));

        let ini = Ini::load_from_str("[pool]\nworkers = 0\n").unwrap();
        assert!(SyncConfig::from_ini(&ini).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = SyncConfig::default();
        config.pool = config.pool.with_workers(5).with_identity("agent/1.0");
        config.output_dir = PathBuf::from("/srv/game");
        config.save_to(&path).unwrap();

        let loaded = SyncConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_with_workers_minimum() {
        let pool = PoolConfig::default().with_workers(0);
        assert_eq!(pool.workers, 1);
        assert_eq!(pool.max_concurrent_fetches, 1);
    }
}
