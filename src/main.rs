//! # Bulletin
//!
//! Collects RSS/Atom feeds into a local article cache and composes a
//! periodic HTML bulletin from it.
//!
//! ## Usage
//!
//! ```sh
//! bulletin                     # clean, fetch, compose
//! bulletin fetch               # refresh the cache only
//! bulletin compose --days 1    # HTML for the last completed day on stdout
//! bulletin clean               # empty the cache
//! bulletin test                # local self-check
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: download each configured feed (bounded concurrency,
//!    retry with backoff) and store its entries in the cache
//! 2. **Aligning**: map "now" to the last completed period on a grid fixed
//!    at the configured anchor
//! 3. **Composing**: select cached articles updated inside that window and
//!    render them as HTML
//!
//! The bulletin goes to stdout; logs and the final `ERROR.` line go to
//! stderr. The exit status is 1 on any failure.

use chrono::Utc;
use clap::Parser;
use clap::error::ErrorKind;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod command;
mod config;
mod digest;
mod error;
mod fetch;
mod http;
mod interval;
mod models;
mod outputs;
mod utils;

use cache::ArticleCache;
use cli::Cli;
use command::{Command, Context};
use config::{CACHE_BASE_NAME, CONFIG_FILE_NAME, Settings, default_base_dir};
use error::{BulletinError, Result};
use http::{HttpFetcher, RetryFetch};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let rendered = e.to_string();
            let first = rendered.lines().next().unwrap_or("invalid arguments");
            eprintln!("ERROR. {}", first.trim_start_matches("error: "));
            return ExitCode::FAILURE;
        }
    };

    // --- Tracing init ---
    let default_level = cli::default_log_level(args.verbose);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR. {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    let start_time = Instant::now();
    debug!(?args, "Parsed CLI arguments");

    let cache_root = match args.cache {
        Some(path) => path,
        None => {
            let path = default_base_dir()?.join(CACHE_BASE_NAME);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| BulletinError::storage(&path, e))?;
            path
        }
    };

    let (config_path, required): (PathBuf, bool) = match args.config {
        Some(path) => (path, true),
        None => (default_base_dir()?.join(CONFIG_FILE_NAME), false),
    };
    let settings = Settings::load(&config_path, required).await?;

    let fetcher = RetryFetch::new(
        HttpFetcher::new(&settings.http)?,
        settings.http.max_retries,
        Duration::from_millis(settings.http.base_delay_ms),
    );
    let ctx = Context::new(ArticleCache::new(cache_root), settings, fetcher, config_path);

    let command = Command::from(args.command);
    info!(?command, cache = %ctx.cache.root().display(), "bulletin starting");

    command
        .execute(&ctx, Utc::now(), &mut std::io::stdout())
        .await?;

    let elapsed = start_time.elapsed();
    info!(?elapsed, ?command, "Execution complete");
    Ok(())
}
