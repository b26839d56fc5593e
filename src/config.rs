//! Settings file loading and validation.
//!
//! Settings live in a YAML file, by default `~/.bulletin/config.yaml`. Every
//! key is optional; a missing default file behaves like an empty one.
//!
//! ```yaml
//! anchor: 2000-01-03T00:00:00Z
//! days: 7
//! concurrency: 4
//! strict: false
//! http:
//!   user_agent: bulletin/0.1
//!   timeout_secs: 30
//!   max_retries: 3
//!   base_delay_ms: 500
//! feeds:
//!   - url: https://example.com/feed.xml
//!     name: Example
//! ```

use crate::error::{BulletinError, Result};
use crate::interval::{Period, default_anchor};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Directory under `$HOME` holding the cache and the settings file.
pub const BULLETIN_DIR: &str = ".bulletin";
pub const CACHE_BASE_NAME: &str = "cache";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// `$HOME/.bulletin`.
pub fn default_base_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(BULLETIN_DIR))
        .ok_or_else(|| {
            BulletinError::configuration("cannot determine home directory ($HOME unset)")
        })
}

/// A feed to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedSource {
    pub url: String,
    /// Overrides the feed's own title in the bulletin.
    #[serde(default)]
    pub name: Option<String>,
}

/// HTTP client knobs for the fetch stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub base_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("bulletin/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Origin of the period grid; fixed for the lifetime of the process.
    pub anchor: DateTime<Utc>,
    /// Period length used by `compose` when `--days` is not given.
    pub days: i64,
    /// Feeds fetched in parallel.
    pub concurrency: usize,
    /// Fail the fetch command when any feed fails.
    pub strict: bool,
    pub http: HttpSettings,
    pub feeds: Vec<FeedSource>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            anchor: default_anchor(),
            days: 7,
            concurrency: 4,
            strict: false,
            http: HttpSettings::default(),
            feeds: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse and validate settings from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(text)
            .map_err(|e| BulletinError::configuration(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - YAML settings file
    /// * `required` - Whether a missing file is an error (true when the path
    ///   was given on the command line)
    ///
    /// # Returns
    ///
    /// The validated settings, or [`Settings::default`] when the file is
    /// missing and not `required`.
    ///
    /// # Errors
    ///
    /// [`BulletinError::Configuration`] if the file cannot be read, does not
    /// parse, or fails [`Settings::validate`]. The message names the path.
    pub async fn load(path: &Path, required: bool) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let settings = Self::from_yaml(&text).map_err(|e| match e {
                    BulletinError::Configuration(msg) => {
                        BulletinError::configuration(format!("{}: {msg}", path.display()))
                    }
                    other => other,
                })?;
                info!(path = %path.display(), feeds = settings.feeds.len(), "Loaded settings");
                Ok(settings)
            }
            Err(e) if e.kind() == ErrorKind::NotFound && !required => {
                debug!(path = %path.display(), "No settings file; using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(BulletinError::configuration(format!(
                "cannot read settings {}: {e}",
                path.display()
            ))),
        }
    }

    /// Check value ranges and feed URLs.
    ///
    /// # Errors
    ///
    /// [`BulletinError::Configuration`] if:
    /// - `days`, `concurrency` or `http.timeout_secs` is not positive
    /// - a feed URL does not parse or is not `http`/`https`
    /// - a feed URL is listed twice
    pub fn validate(&self) -> Result<()> {
        self.period()?;

        if self.concurrency == 0 {
            return Err(BulletinError::configuration("concurrency must be at least 1"));
        }
        if self.http.timeout_secs == 0 {
            return Err(BulletinError::configuration("http.timeout_secs must be at least 1"));
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            let url = Url::parse(&feed.url).map_err(|e| {
                BulletinError::configuration(format!("invalid feed url {:?}: {e}", feed.url))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(BulletinError::configuration(format!(
                    "feed url {:?} must use http or https",
                    feed.url
                )));
            }
            if !seen.insert(url) {
                return Err(BulletinError::configuration(format!(
                    "feed url {:?} listed more than once",
                    feed.url
                )));
            }
        }
        Ok(())
    }

    /// Default compose period.
    pub fn period(&self) -> Result<Period> {
        Period::days(self.days)
    }
}
