//! Manisync CLI - Command-line interface
//!
//! This binary drives the manisync library: `manisync sync <URL>` mirrors a
//! manifest into a local directory, `manisync config` manages settings.

mod cli;
mod commands;
mod error;

use clap::Parser;
use console::style;
use manisync::logging::init_logging;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

fn main() {
    let cli = Cli::parse();

    let guard = match init_logging(&cli.log_config()) {
        Ok(guard) => guard,
        Err(e) => exit_with(CliError::Logging(e.to_string())),
    };

    let result = match cli.command {
        Commands::Sync(args) => commands::sync::run(args),
        Commands::Config { command } => commands::config::run(command),
    };

    // Flush the log file before exiting.
    drop(guard);

    if let Err(e) = result {
        exit_with(e);
    }
}

fn exit_with(error: CliError) -> ! {
    eprintln!("{} {}", style("error:").red().bold(), error);
    std::process::exit(error.exit_code());
}
