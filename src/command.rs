//! Command dispatch.
//!
//! Each CLI subcommand maps to one [`Command`] variant; [`Command::execute`]
//! runs it against a [`Context`] built once in `main`. Command output (the
//! bulletin HTML, the self-check report) goes to the writer handed in, logs
//! go through `tracing`.

use crate::cache::ArticleCache;
use crate::config::Settings;
use crate::digest;
use crate::error::{BulletinError, Result};
use crate::fetch::{FetchReport, fetch_all};
use crate::http::FetchFeed;
use crate::interval::{IntervalAligner, Period};
use crate::outputs::html;
use crate::utils::ensure_writable_dir;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Fetch,
    /// `days` overrides the configured period.
    Compose { days: Option<i64> },
    Clean,
    Test,
    /// `clean`, `fetch`, `compose`; stops at the first error.
    DefaultSequence,
}

/// Everything a command needs, resolved from flags and settings.
#[derive(Debug)]
pub struct Context<F> {
    pub cache: ArticleCache,
    pub settings: Settings,
    pub aligner: IntervalAligner,
    pub fetcher: F,
    /// Where `settings` came from; only reported.
    pub config_path: PathBuf,
}

impl<F: FetchFeed> Context<F> {
    pub fn new(cache: ArticleCache, settings: Settings, fetcher: F, config_path: PathBuf) -> Self {
        let aligner = IntervalAligner::new(settings.anchor);
        Self {
            cache,
            settings,
            aligner,
            fetcher,
            config_path,
        }
    }
}

impl Command {
    /// Run the command. `now` is the instant compose aligns windows to.
    pub async fn execute<F, W>(
        &self,
        ctx: &Context<F>,
        now: DateTime<Utc>,
        out: &mut W,
    ) -> Result<()>
    where
        F: FetchFeed,
        W: Write,
    {
        match *self {
            Command::Fetch => fetch(ctx).await.map(|_| ()),
            Command::Compose { days } => compose(ctx, days, now, out).await,
            Command::Clean => clean(ctx).await,
            Command::Test => self_check(ctx, now, out).await,
            Command::DefaultSequence => {
                clean(ctx).await?;
                fetch(ctx).await?;
                compose(ctx, None, now, out).await
            }
        }
    }
}

fn write_err(e: std::io::Error) -> BulletinError {
    BulletinError::Format(format!("cannot write output: {e}"))
}

async fn clean<F>(ctx: &Context<F>) -> Result<()> {
    ctx.cache.clear().await
}

#[instrument(level = "info", skip_all)]
async fn fetch<F: FetchFeed>(ctx: &Context<F>) -> Result<FetchReport> {
    let report = fetch_all(
        &ctx.fetcher,
        &ctx.cache,
        &ctx.settings.feeds,
        ctx.settings.concurrency,
    )
    .await?;

    if ctx.settings.strict {
        report.ensure_complete()?;
    } else if !report.failures.is_empty() {
        warn!(failed = report.failures.len(), "Some feeds failed; continuing");
    }
    Ok(report)
}

async fn compose<F, W: Write>(
    ctx: &Context<F>,
    days: Option<i64>,
    now: DateTime<Utc>,
    out: &mut W,
) -> Result<()> {
    let period = match days {
        Some(days) => Period::days(days)?,
        None => ctx.settings.period()?,
    };
    let page = digest::compose(&ctx.cache, &ctx.aligner, period, now).await?;
    out.write_all(page.as_bytes()).map_err(write_err)?;
    out.flush().map_err(write_err)
}

/// Exercise every local stage without touching the network.
#[instrument(level = "info", skip_all)]
async fn self_check<F, W: Write>(
    ctx: &Context<F>,
    now: DateTime<Utc>,
    out: &mut W,
) -> Result<()> {
    ensure_writable_dir(ctx.cache.root()).await?;
    ctx.settings.validate()?;

    let cached = ctx.cache.len().await?;
    let period = ctx.settings.period()?;
    let window = ctx.aligner.window(period, now)?;
    let page = html::format_html(period.num_days(), now, &window, &[])?;

    let mut report = String::new();
    report.push_str(&format!(
        "cache:    {} (writable, {cached} articles)\n",
        ctx.cache.root().display()
    ));
    report.push_str(&format!("config:   {}\n", ctx.config_path.display()));
    report.push_str(&format!("feeds:    {}\n", ctx.settings.feeds.len()));
    for feed in &ctx.settings.feeds {
        match &feed.name {
            Some(name) => report.push_str(&format!("  - {} ({name})\n", feed.url)),
            None => report.push_str(&format!("  - {}\n", feed.url)),
        }
    }
    report.push_str(&format!("anchor:   {}\n", ctx.aligner.anchor().to_rfc3339()));
    report.push_str(&format!("period:   {period}\n"));
    report.push_str(&format!("window:   {window}\n"));
    report.push_str(&format!("renderer: ok ({} bytes)\n", page.len()));

    out.write_all(report.as_bytes()).map_err(write_err)?;
    info!(cached, feeds = ctx.settings.feeds.len(), "Self-check passed");
    Ok(())
}
