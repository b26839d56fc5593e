//! Digest composition: pick the cached articles for the current window and
//! render them.

use crate::cache::ArticleCache;
use crate::error::Result;
use crate::interval::{IntervalAligner, Period, Window};
use crate::models::Article;
use crate::outputs::html;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

/// Keep the articles whose `updated` lies in `window`, preserving order.
pub fn select_articles(articles: Vec<Article>, window: &Window) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| {
            let keep = window.contains(a.updated);
            if keep {
                debug!(id = %a.id, updated = %a.updated, "Accept");
            } else {
                debug!(id = %a.id, updated = %a.updated, "Drop");
            }
            keep
        })
        .collect()
}

/// Build the bulletin HTML for the last completed period before `now`.
///
/// An empty selection still renders a valid page.
///
/// # Errors
///
/// Storage errors from the cache, configuration errors from the window
/// computation and format errors from rendering are all returned as is.
#[instrument(level = "info", skip_all, fields(period = %period, now = %now))]
pub async fn compose(
    cache: &ArticleCache,
    aligner: &IntervalAligner,
    period: Period,
    now: DateTime<Utc>,
) -> Result<String> {
    let window = aligner.window(period, now)?;
    let articles = cache.get_all().await?;
    let total = articles.len();

    let selected = select_articles(articles, &window);
    info!(
        %window,
        hours = window.length().num_hours(),
        total,
        selected = selected.len(),
        "Selected articles"
    );

    html::format_html(period.num_days(), now, &window, &selected)
}
