//! Fetch stage: download every configured feed and store its items.
//!
//! Each feed is processed independently:
//! 1. **Download** through a [`FetchFeed`] (retries live in the fetcher)
//! 2. **Parse** the RSS/Atom document with `feed-rs`
//! 3. **Store** every usable entry as an [`Article`] via [`ArticleCache::put`]
//!
//! Feeds run concurrently, `concurrency` at a time. A feed that fails to
//! download or parse is logged and recorded in the [`FetchReport`]; the
//! other feeds carry on. Cache write failures abort the run.

use crate::cache::ArticleCache;
use crate::config::FeedSource;
use crate::error::{BulletinError, Result};
use crate::http::FetchFeed;
use crate::models::Article;
use crate::utils::truncate_for_log;
use feed_rs::model::{Entry, Link};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tracing::{debug, error, info, instrument, warn};

/// Outcome for one feed that was downloaded and parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub url: String,
    /// Entries written to the cache.
    pub stored: usize,
    /// Entries dropped for lack of a timestamp or of any identity.
    pub skipped: usize,
}

/// Summary of a fetch run.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub sources: Vec<SourceReport>,
    pub failures: Vec<BulletinError>,
}

impl FetchReport {
    pub fn stored(&self) -> usize {
        self.sources.iter().map(|s| s.stored).sum()
    }

    /// Fold collected feed failures into one error, for strict runs.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let failed = self
            .failures
            .iter()
            .map(|e| match e {
                BulletinError::Fetch { source_url, .. } => source_url.as_str(),
                _ => "?",
            })
            .join(", ");
        Err(BulletinError::fetch(
            failed,
            format!(
                "{} of {} feeds failed",
                self.failures.len(),
                self.failures.len() + self.sources.len()
            ),
        ))
    }
}

/// Turn a feed document into articles.
///
/// Returns the articles and the number of entries skipped because they carry
/// neither an `updated` nor a `published` timestamp, or neither an id nor a
/// link to identify them by.
pub fn parse_feed(source: &FeedSource, body: &[u8]) -> Result<(Vec<Article>, usize)> {
    let feed =
        feed_rs::parser::parse(body).map_err(|e| BulletinError::fetch(&source.url, e))?;

    let source_title = source
        .name
        .clone()
        .or_else(|| feed.title.map(|t| t.content.trim().to_string()))
        .filter(|t| !t.is_empty());

    let total = feed.entries.len();
    let articles: Vec<Article> = feed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_article(entry, source_title.as_deref()))
        .collect();

    let skipped = total - articles.len();
    Ok((articles, skipped))
}

fn entry_to_article(entry: Entry, source_title: Option<&str>) -> Option<Article> {
    let link = primary_link(&entry.links).map(|l| l.href.clone());
    let id = if entry.id.trim().is_empty() {
        let Some(link) = link.clone() else {
            let title = entry.title.as_ref().map(|t| t.content.as_str());
            warn!(?title, "Entry has no id and no link; skipping");
            return None;
        };
        link
    } else {
        entry.id
    };

    let Some(updated) = entry.updated.or(entry.published) else {
        warn!(%id, "Entry has no timestamp; skipping");
        return None;
    };

    Some(Article {
        id,
        updated,
        published: entry.published,
        title: entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string()),
        summary: entry.summary.map(|s| s.content),
        content: entry.content.and_then(|c| c.body),
        link,
        source: source_title.map(str::to_string),
    })
}

/// The `alternate` link if any, else the first link.
fn primary_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| l.rel.as_deref().is_none_or(|rel| rel == "alternate"))
        .or_else(|| links.first())
}

#[instrument(level = "info", skip_all, fields(url = %source.url))]
async fn fetch_source<F: FetchFeed>(
    fetcher: &F,
    cache: &ArticleCache,
    source: &FeedSource,
) -> Result<SourceReport> {
    let body = fetcher.fetch(&source.url).await?;
    let (articles, skipped) = parse_feed(source, &body).inspect_err(|_| {
        debug!(
            body = %truncate_for_log(&String::from_utf8_lossy(&body), 200),
            "Response is not a feed"
        );
    })?;

    for article in &articles {
        cache.put(article).await?;
    }

    info!(stored = articles.len(), skipped, "Stored feed entries");
    Ok(SourceReport {
        url: source.url.clone(),
        stored: articles.len(),
        skipped,
    })
}

/// Fetch every feed in `sources` and store the results in `cache`.
///
/// # Arguments
///
/// * `fetcher` - Downloads feed bodies; usually a [`crate::http::RetryFetch`]
/// * `cache` - Destination for every parsed entry
/// * `sources` - Configured feeds, processed in no particular order
/// * `concurrency` - Maximum number of feeds in flight (at least 1 is used)
///
/// # Returns
///
/// A [`FetchReport`] with per-feed counts for the feeds that succeeded and
/// the errors of those that did not.
///
/// # Errors
///
/// Only [`BulletinError::Storage`] (or any other non-fetch error) is
/// returned; per-feed failures end up in [`FetchReport::failures`].
#[instrument(level = "info", skip_all, fields(feeds = sources.len(), concurrency = concurrency))]
pub async fn fetch_all<F: FetchFeed>(
    fetcher: &F,
    cache: &ArticleCache,
    sources: &[FeedSource],
    concurrency: usize,
) -> Result<FetchReport> {
    if sources.is_empty() {
        warn!("No feeds configured; nothing to fetch");
        return Ok(FetchReport::default());
    }

    let results: Vec<Result<SourceReport>> = stream::iter(sources)
        .map(|source| fetch_source(fetcher, cache, source))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = FetchReport::default();
    for result in results {
        match result {
            Ok(source) => report.sources.push(source),
            Err(e) if e.is_recoverable() => {
                error!(error = %e, "Feed failed; continuing with the others");
                report.failures.push(e);
            }
            Err(e) => return Err(e),
        }
    }

    debug!(sources = ?report.sources, "Per-feed results");
    info!(
        feeds = sources.len(),
        succeeded = report.sources.len(),
        failed = report.failures.len(),
        stored = report.stored(),
        "Fetch complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StaticFetcher;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com/</link>
    <description>Test feed</description>
    <item>
      <title>First story</title>
      <link>https://news.example.com/first</link>
      <guid>https://news.example.com/first</guid>
      <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
      <pubDate>Sat, 15 Jan 2000 00:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Undated story</title>
      <link>https://news.example.com/undated</link>
      <guid>https://news.example.com/undated</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Blog</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2000-01-16T12:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <link rel="alternate" href="https://blog.example.com/entry"/>
    <link rel="edit" href="https://blog.example.com/edit/entry"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <published>2000-01-14T09:00:00Z</published>
    <updated>2000-01-16T12:00:00Z</updated>
    <summary>Short summary</summary>
    <content type="html">&lt;p&gt;Full body&lt;/p&gt;</content>
  </entry>
</feed>"#;

    fn source(url: &str) -> FeedSource {
        FeedSource {
            url: url.to_string(),
            name: None,
        }
    }

    #[test]
    fn test_parse_rss_uses_pubdate_and_skips_undated() {
        let (articles, skipped) =
            parse_feed(&source("https://news.example.com/rss"), RSS.as_bytes()).unwrap();

        assert_eq!(skipped, 1);
        assert_eq!(articles.len(), 1);
        let article = &articles[0];
        assert_eq!(article.title, "First story");
        assert_eq!(article.link.as_deref(), Some("https://news.example.com/first"));
        assert_eq!(article.updated.to_rfc3339(), "2000-01-15T00:00:00+00:00");
        assert_eq!(article.source.as_deref(), Some("Example News"));
        assert!(article.summary.as_deref().unwrap().contains("<b>world</b>"));
    }

    #[test]
    fn test_parse_atom_prefers_updated_and_alternate_link() {
        let (articles, skipped) =
            parse_feed(&source("https://blog.example.com/atom"), ATOM.as_bytes()).unwrap();

        assert_eq!(skipped, 0);
        let article = &articles[0];
        assert_eq!(article.id, "urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a");
        assert_eq!(article.updated.to_rfc3339(), "2000-01-16T12:00:00+00:00");
        assert_eq!(
            article.published.map(|p| p.to_rfc3339()).as_deref(),
            Some("2000-01-14T09:00:00+00:00")
        );
        assert_eq!(article.link.as_deref(), Some("https://blog.example.com/entry"));
        assert_eq!(article.summary.as_deref(), Some("Short summary"));
        assert!(article.content.as_deref().unwrap().contains("Full body"));
    }

    #[test]
    fn test_configured_name_overrides_feed_title() {
        let feed = FeedSource {
            url: "https://blog.example.com/atom".into(),
            name: Some("My Blog".into()),
        };
        let (articles, _) = parse_feed(&feed, ATOM.as_bytes()).unwrap();
        assert_eq!(articles[0].source.as_deref(), Some("My Blog"));
    }

    #[test]
    fn test_entry_without_identity_is_skipped() {
        let anonymous = Entry {
            updated: Some("2000-01-15T00:00:00Z".parse().unwrap()),
            ..Entry::default()
        };
        assert!(entry_to_article(anonymous, Some("Example")).is_none());

        let identified = Entry {
            id: "urn:example:1".into(),
            updated: Some("2000-01-15T00:00:00Z".parse().unwrap()),
            ..Entry::default()
        };
        let article = entry_to_article(identified, Some("Example")).unwrap();
        assert_eq!(article.id, "urn:example:1");
        assert_eq!(article.title, "Untitled");
        assert_eq!(article.link, None);
    }

    #[test]
    fn test_garbage_is_fetch_error() {
        let url = "https://x.example.com/feed";
        let err = parse_feed(&source(url), b"this is not xml").unwrap_err();
        assert!(matches!(err, BulletinError::Fetch { ref source_url, .. } if source_url == url));
    }

    #[tokio::test]
    async fn test_failing_feed_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());
        let fetcher = StaticFetcher::new(&[
            ("https://news.example.com/rss", RSS),
            ("https://blog.example.com/atom", ATOM),
            ("https://broken.example.com/feed", "<html>nope</html"),
        ]);
        let sources = vec![
            source("https://news.example.com/rss"),
            source("https://missing.example.com/feed"),
            source("https://blog.example.com/atom"),
            source("https://broken.example.com/feed"),
        ];

        let report = fetch_all(&fetcher, &cache, &sources, 2).await.unwrap();

        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.stored(), 2);
        assert_eq!(cache.get_all().await.unwrap().len(), 2);
        assert_eq!(fetcher.requested.lock().unwrap().len(), 4);
        assert!(report.ensure_complete().is_err());
    }

    #[tokio::test]
    async fn test_refetch_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());
        let fetcher = StaticFetcher::new(&[("https://blog.example.com/atom", ATOM)]);
        let sources = vec![source("https://blog.example.com/atom")];

        fetch_all(&fetcher, &cache, &sources, 1).await.unwrap();
        let first = cache.get_all().await.unwrap();
        fetch_all(&fetcher, &cache, &sources, 1).await.unwrap();

        assert_eq!(cache.get_all().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("cache");
        std::fs::write(&blocker, b"").unwrap();
        let cache = ArticleCache::new(&blocker);
        let fetcher = StaticFetcher::new(&[("https://blog.example.com/atom", ATOM)]);

        let sources = [source("https://blog.example.com/atom")];
        let result = fetch_all(&fetcher, &cache, &sources, 1).await;
        assert!(matches!(result, Err(BulletinError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_no_feeds_is_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());
        let fetcher = StaticFetcher::new(&[]);

        let report = fetch_all(&fetcher, &cache, &[], 4).await.unwrap();
        assert_eq!(report.stored(), 0);
        assert!(report.ensure_complete().is_ok());
    }
}
