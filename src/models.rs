//! Data models for cached feed articles.
//!
//! This module defines the one record type that flows through the pipeline:
//! - [`Article`]: a normalized feed item, created by the fetch stage,
//!   persisted by the cache and read back by the digest composer.
//!
//! Only [`Article::id`] and [`Article::updated`] carry meaning for the core
//! logic. Every other field is display data passed through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized feed item.
///
/// # Identity
///
/// `id` is the stable identity of the source item across repeated fetches
/// (RSS `guid`, Atom `id`, or the identifier the feed parser derives when the
/// feed omits one). The cache keeps at most one record per `id`.
///
/// # Windowing
///
/// `updated` decides which bulletin an article lands in. A feed that bumps
/// an item's `updated` timestamp makes it reappear in a later bulletin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Article {
    /// Stable identity of the source item.
    pub id: String,
    /// Last known modification time, UTC.
    pub updated: DateTime<Utc>,
    /// Original publication time, when the feed provides one.
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    /// Headline.
    pub title: String,
    /// Short description, usually HTML.
    #[serde(default)]
    pub summary: Option<String>,
    /// Full body, usually HTML.
    #[serde(default)]
    pub content: Option<String>,
    /// Permalink to the item.
    #[serde(default)]
    pub link: Option<String>,
    /// Title of the feed this item came from.
    #[serde(default)]
    pub source: Option<String>,
}

impl Article {
    /// Text used for the digest excerpt: the summary, or the body when the
    /// feed only ships full content.
    pub fn excerpt_source(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.content.as_deref())
    }
}

#[cfg(test)]
pub(crate) fn sample_article(id: &str, updated: &str) -> Article {
    Article {
        id: id.to_string(),
        updated: DateTime::parse_from_rfc3339(updated)
            .unwrap()
            .with_timezone(&Utc),
        published: None,
        title: format!("Title of {id}"),
        summary: Some(format!("<p>Summary of {id}</p>")),
        content: None,
        link: Some(format!("https://example.com/{id}")),
        source: Some("Example".to_string()),
    }
}
