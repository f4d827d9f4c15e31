//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use manisync::logging::LogConfig;

use crate::commands::config::ConfigCommands;

/// Synchronize a multi-tier download manifest into a local directory.
#[derive(Debug, Parser)]
#[command(name = "manisync", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Logging options derived from the global flags.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: Some(if self.verbose { "debug" } else { "warn" }.to_string()),
            file: self.log_file.clone(),
        }
    }
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize a manifest into the output directory
    Sync(SyncArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Arguments for `manisync sync`.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// URL of the top-level manifest
    pub url: String,

    /// Output directory (defaults to `output_dir` from the config file)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of worker threads
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// User-Agent sent with every request
    #[arg(long, value_name = "UA")]
    pub identity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync() {
        let cli = Cli::try_parse_from([
            "manisync",
            "sync",
            "https://example.com/index.json",
            "--output",
            "/tmp/out",
            "--workers",
            "8",
            "--identity",
            "launcher/1.0",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.url, "https://example.com/index.json");
                assert_eq!(args.output, Some(PathBuf::from("/tmp/out")));
                assert_eq!(args.workers, Some(8));
                assert_eq!(args.identity.as_deref(), Some("launcher/1.0"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Cli::try_parse_from(["manisync", "sync", "u", "--workers", "0"]).is_err());
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["manisync", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Init { force: true }
            }
        ));
    }

    #[test]
    fn test_log_level_follows_verbose() {
        let cli = Cli::try_parse_from(["manisync", "config", "show"]).unwrap();
        assert_eq!(cli.log_config().level.as_deref(), Some("warn"));

        let cli = Cli::try_parse_from(["manisync", "--verbose", "config", "show"]).unwrap();
        assert_eq!(cli.log_config().level.as_deref(), Some("debug"));
    }
}
