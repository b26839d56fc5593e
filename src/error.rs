//! Error taxonomy for the bulletin pipeline.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! is one of four kinds:
//!
//! | Variant | Raised by | Fatal? |
//! |---------|-----------|--------|
//! | [`BulletinError::Configuration`] | flags, settings file, period/window math | yes |
//! | [`BulletinError::Storage`] | the article cache | yes |
//! | [`BulletinError::Fetch`] | a single feed source | collected, fatal only in strict mode |
//! | [`BulletinError::Format`] | the HTML renderer | yes |

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by any stage of a bulletin run.
#[derive(Debug, Error)]
pub enum BulletinError {
    /// Bad flag or settings value.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Cache directory or record could not be read, written or decoded.
    #[error("storage: {path}: {message}")]
    Storage { path: PathBuf, message: String },

    /// A feed source could not be retrieved or parsed.
    #[error("fetch {source_url}: {message}")]
    Fetch { source_url: String, message: String },

    /// The digest could not be rendered.
    #[error("format: {0}")]
    Format(String),
}

impl BulletinError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn fetch(source_url: impl Into<String>, message: impl ToString) -> Self {
        Self::Fetch {
            source_url: source_url.into(),
            message: message.to_string(),
        }
    }

    /// `true` for the errors a fetch run collects instead of aborting on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}

impl From<std::fmt::Error> for BulletinError {
    fn from(e: std::fmt::Error) -> Self {
        Self::Format(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BulletinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_message_includes_path() {
        let err = BulletinError::storage("/tmp/cache/abc.json", "permission denied");
        assert_eq!(
            err.to_string(),
            "storage: /tmp/cache/abc.json: permission denied"
        );
    }

    #[test]
    fn test_only_fetch_errors_are_recoverable() {
        assert!(BulletinError::fetch("https://example.com/feed", "timeout").is_recoverable());
        assert!(!BulletinError::configuration("days must be positive").is_recoverable());
        assert!(!BulletinError::storage("/tmp", "gone").is_recoverable());
        assert!(!BulletinError::Format("boom".into()).is_recoverable());
    }
}
