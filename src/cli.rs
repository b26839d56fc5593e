//! Command-line interface definitions for bulletin.
//!
//! Global options come before or after the subcommand; running without a
//! subcommand performs `clean`, `fetch` and `compose` in that order.

use crate::command::Command;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for bulletin.
///
/// # Examples
///
/// ```sh
/// # Refresh the cache and print this week's bulletin
/// bulletin > bulletin.html
///
/// # Only download feeds, with a custom cache directory
/// bulletin --cache /var/cache/bulletin fetch
///
/// # Bulletin for the last completed day
/// bulletin compose --days 1
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Cache directory [default: $HOME/.bulletin/cache]
    #[arg(long, global = true, env = "BULLETIN_CACHE")]
    pub cache: Option<PathBuf>,

    /// Path to config.yaml [default: $HOME/.bulletin/config.yaml]
    #[arg(short, long, global = true, env = "BULLETIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Download all configured feeds into the cache
    Fetch,
    /// Print the bulletin for the last completed period as HTML
    Compose {
        /// Period length in days [default: `days` from the config]
        #[arg(long, allow_negative_numbers = true)]
        days: Option<i64>,
    },
    /// Remove every cached article
    Clean,
    /// Check the cache directory and settings without touching the network
    Test,
}

/// Log filter used when `RUST_LOG` is unset. `--verbose` adds the
/// per-article accept/drop lines.
pub fn default_log_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

impl From<Option<CliCommand>> for Command {
    fn from(command: Option<CliCommand>) -> Self {
        match command {
            None => Command::DefaultSequence,
            Some(CliCommand::Fetch) => Command::Fetch,
            Some(CliCommand::Compose { days }) => Command::Compose { days },
            Some(CliCommand::Clean) => Command::Clean,
            Some(CliCommand::Test) => Command::Test,
        }
    }
}
