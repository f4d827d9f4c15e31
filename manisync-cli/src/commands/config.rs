//! Configuration management CLI commands.
//!
//! Provides `config show` and `config init` for inspecting and creating the
//! configuration file.

use std::io::{self, Write};
use std::path::Path;

use clap::Subcommand;
use manisync::SyncConfig;

use super::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration and the file it was read from
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    let path = SyncConfig::default_path()?;
    match command {
        ConfigCommands::Show => {
            let config = load_config()?;
            show(&config, &path, &mut io::stdout().lock())
        }
        ConfigCommands::Init { force } => {
            init(&path, force)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn show(config: &SyncConfig, path: &Path, out: &mut impl Write) -> Result<(), CliError> {
    let origin = if path.exists() { "" } else { " (not present, defaults)" };
    writeln!(out, "# {}{}", path.display(), origin)?;
    config.to_ini().write_to(out)?;
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::ConfigExists(path.display().to_string()));
    }
    SyncConfig::default().save_to(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manisync").join("config.ini");

        init(&path, false).unwrap();

        let loaded = SyncConfig::load_from(&path).unwrap();
        assert_eq!(loaded, SyncConfig::default());
    }

    #[test]
    fn test_init_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[pool]\nworkers = 3\n").unwrap();

        assert!(matches!(
            init(&path, false),
            Err(CliError::ConfigExists(_))
        ));
        assert_eq!(SyncConfig::load_from(&path).unwrap().pool.workers, 3);

        init(&path, true).unwrap();
        assert_eq!(SyncConfig::load_from(&path).unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_show_prints_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        let mut out = Vec::new();

        show(&SyncConfig::default(), &path, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("defaults"));
        assert!(text.contains("[pool]"));
        assert!(text.contains("[sync]"));
        assert!(text.contains("identity"));
    }
}
