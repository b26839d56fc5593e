//! HTML rendering of a bulletin.
//!
//! Pure formatting: the composer hands over the articles already selected
//! for the window and this module only decides how they look.
//!
//! # Layout
//!
//! ```text
//! <h1>Bulletin: 7 days to 2000-01-20</h1>
//! <p class="window">…window bounds…</p>
//! <section>                       one per source, alphabetical
//!   <h2>Example News</h2>
//!   <article>…</article>          newest first
//! </section>
//! ```
//!
//! Feed summaries are HTML of unknown quality, so only their text survives:
//! markup is stripped, whitespace collapsed and the result escaped.

use crate::error::Result;
use crate::interval::Window;
use crate::models::Article;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::cmp::Reverse;
use std::fmt::Write;
use tracing::{debug, instrument};
use url::Url;

/// Excerpts longer than this many characters are cut.
const EXCERPT_CHARS: usize = 280;

const UNNAMED_SOURCE: &str = "Other";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Escape text for use in element content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Visible text of an HTML fragment, whitespace collapsed.
pub fn plain_text(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Cut `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}…", text[..byte_idx].trim_end()),
    }
}

fn safe_link(link: Option<&str>) -> Option<&str> {
    link.filter(|l| {
        Url::parse(l)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    })
}

fn write_article(out: &mut String, article: &Article) -> Result<()> {
    let title = escape_html(article.title.trim());
    writeln!(out, "    <article>")?;
    match safe_link(article.link.as_deref()) {
        Some(link) => writeln!(
            out,
            "      <h3><a href=\"{}\">{}</a></h3>",
            escape_html(link),
            title
        )?,
        None => writeln!(out, "      <h3>{title}</h3>")?,
    }
    writeln!(
        out,
        "      <time datetime=\"{}\">{}</time>",
        article.updated.to_rfc3339(),
        article.updated.format("%Y-%m-%d %H:%M UTC")
    )?;

    let excerpt = article
        .excerpt_source()
        .map(plain_text)
        .filter(|t| !t.is_empty());
    if let Some(excerpt) = excerpt {
        writeln!(
            out,
            "      <p>{}</p>",
            escape_html(&truncate_chars(&excerpt, EXCERPT_CHARS))
        )?;
    }
    writeln!(out, "    </article>")?;
    Ok(())
}

/// Render the bulletin page for `articles`.
///
/// # Arguments
///
/// * `period_days` - Period length shown in the heading
/// * `now` - Composition instant; its date is shown in the heading
/// * `window` - Bounds printed under the heading
/// * `articles` - Articles to show, already selected for `window`
///
/// # Returns
///
/// A complete HTML5 document. An empty `articles` slice still yields a valid
/// page with a "No articles" paragraph.
///
/// # Examples
///
/// ```ignore
/// let html = format_html(7, now, &window, &selected)?;
/// assert!(html.starts_with("<!DOCTYPE html>"));
/// ```
#[instrument(level = "debug", skip_all, fields(articles = articles.len()))]
pub fn format_html(
    period_days: i64,
    now: DateTime<Utc>,
    window: &Window,
    articles: &[Article],
) -> Result<String> {
    let heading = format!(
        "Bulletin: {} day{} to {}",
        period_days,
        if period_days == 1 { "" } else { "s" },
        now.format("%Y-%m-%d")
    );

    let mut out = String::new();
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "  <meta charset=\"utf-8\">")?;
    writeln!(out, "  <title>{}</title>", escape_html(&heading))?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "  <h1>{}</h1>", escape_html(&heading))?;
    writeln!(
        out,
        "  <p class=\"window\">Articles updated after {} and up to {}.</p>",
        window.start.format("%Y-%m-%d %H:%M UTC"),
        window.end.format("%Y-%m-%d %H:%M UTC")
    )?;

    if articles.is_empty() {
        writeln!(out, "  <p>No articles in this period.</p>")?;
    }

    let ordered = articles
        .iter()
        .sorted_by_key(|a| (a.source.is_none(), a.source.clone(), Reverse(a.updated)));

    for (source, group) in &ordered.chunk_by(|a| a.source.clone()) {
        writeln!(out, "  <section>")?;
        writeln!(
            out,
            "    <h2>{}</h2>",
            escape_html(source.as_deref().unwrap_or(UNNAMED_SOURCE))
        )?;
        for article in group {
            write_article(&mut out, article)?;
        }
        writeln!(out, "  </section>")?;
    }

    writeln!(out, "</body>")?;
    writeln!(out, "</html>")?;

    debug!(bytes = out.len(), "Rendered bulletin");
    Ok(out)
}
