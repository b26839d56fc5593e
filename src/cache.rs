//! On-disk article cache.
//!
//! Articles are stored one JSON document per file under a single directory:
//!
//! ```text
//! ~/.bulletin/cache/
//! ├── 3f7a…e1.json      # sha256(article id), lowercase hex
//! ├── 9b02…4c.json
//! └── .9b02…4c.5d1e….tmp  # in-flight write, never read
//! ```
//!
//! Hashing the identity gives a fixed-length, filesystem-safe key for any
//! feed id; the id itself lives inside the record.
//!
//! # Write protocol
//!
//! [`ArticleCache::put`] writes the record to a uniquely named temporary file
//! in the cache directory and renames it over the final name. Rename within
//! one directory is atomic, so concurrent writers (even for the same id) and
//! readers only ever see a complete record. The last rename wins.

use crate::error::{BulletinError, Result};
use crate::models::Article;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// File-name key for an article id.
pub fn record_key(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identity-keyed article store rooted at a directory.
#[derive(Debug, Clone)]
pub struct ArticleCache {
    root: PathBuf,
}

impl ArticleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.{RECORD_EXTENSION}", record_key(id)))
    }

    /// Insert or replace the record for `article.id`.
    ///
    /// The record is written to a temporary file and renamed into place, so
    /// a reader never sees a partial record and the last writer wins.
    ///
    /// # Arguments
    ///
    /// * `article` - The article to store; its `id` selects the record file
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let cache = ArticleCache::new("/tmp/bulletin-cache");
    /// cache.put(&article).await?;
    /// cache.put(&article).await?; // still one record
    /// assert_eq!(cache.len().await?, 1);
    /// ```
    ///
    /// # Errors
    ///
    /// [`BulletinError::Storage`] if the directory cannot be created or the
    /// record cannot be written.
    #[instrument(level = "debug", skip_all, fields(id = %article.id))]
    pub async fn put(&self, article: &Article) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| BulletinError::storage(&self.root, e))?;

        let final_path = self.record_path(&article.id);
        let bytes = serde_json::to_vec_pretty(article)
            .map_err(|e| BulletinError::storage(&final_path, e))?;

        let temp_path = self.root.join(format!(
            ".{}.{:016x}.{TEMP_EXTENSION}",
            record_key(&article.id),
            rand::random::<u64>()
        ));

        if let Err(e) = fs::write(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(BulletinError::storage(&temp_path, e));
        }
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(BulletinError::storage(&final_path, e));
        }

        debug!(path = %final_path.display(), bytes = bytes.len(), "Stored article");
        Ok(())
    }

    /// Every stored article, in no particular order.
    ///
    /// A cache directory that does not exist yet holds no articles.
    ///
    /// # Errors
    ///
    /// [`BulletinError::Storage`] if the directory or a record cannot be
    /// read, or a record does not decode.
    #[instrument(level = "debug", skip_all, fields(root = %self.root.display()))]
    pub async fn get_all(&self) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        for path in self.record_paths().await? {
            let bytes = fs::read(&path)
                .await
                .map_err(|e| BulletinError::storage(&path, e))?;
            let article: Article = serde_json::from_slice(&bytes)
                .map_err(|e| BulletinError::storage(&path, format!("corrupt record: {e}")))?;
            articles.push(article);
        }

        debug!(count = articles.len(), "Loaded cached articles");
        Ok(articles)
    }

    /// Number of stored articles.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.record_paths().await?.len())
    }

    /// Remove every stored article, and any leftover temporary files.
    ///
    /// The directory itself is kept.
    #[instrument(level = "debug", skip_all, fields(root = %self.root.display()))]
    pub async fn clear(&self) -> Result<()> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache directory absent; nothing to clear");
                return Ok(());
            }
            Err(e) => return Err(BulletinError::storage(&self.root, e)),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BulletinError::storage(&self.root, e))?
        {
            let path = entry.path();
            if !is_record(&path) && !is_temp(&path) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                // Raced with another remover.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(BulletinError::storage(&path, e)),
            }
        }

        info!(removed, root = %self.root.display(), "Cleared article cache");
        Ok(())
    }

    async fn record_paths(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(root = %self.root.display(), "Cache directory does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(BulletinError::storage(&self.root, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BulletinError::storage(&self.root, e))?
        {
            let path = entry.path();
            if is_record(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn is_record(path: &Path) -> bool {
    file_name(path).is_some_and(|n| !n.starts_with('.'))
        && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
}

fn is_temp(path: &Path) -> bool {
    file_name(path).is_some_and(|n| n.starts_with('.'))
        && path.extension().is_some_and(|ext| ext == TEMP_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sample_article;
    use futures::future::join_all;

    #[test]
    fn test_record_key_format() {
        let key = record_key("https://example.com/items/1");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(key, record_key("https://example.com/items/1"));
        assert_ne!(key, record_key("https://example.com/items/2"));
    }

    #[tokio::test]
    async fn test_put_then_get_all() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());

        let a = sample_article("a", "2000-01-15T00:00:00Z");
        let b = sample_article("b", "2000-01-16T00:00:00Z");
        cache.put(&a).await.unwrap();
        cache.put(&b).await.unwrap();

        let mut all = cache.get_all().await.unwrap();
        all.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(all, vec![a, b]);
        assert_eq!(cache.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());
        let article = sample_article("same", "2000-01-15T00:00:00Z");

        cache.put(&article).await.unwrap();
        cache.put(&article).await.unwrap();

        assert_eq!(cache.get_all().await.unwrap(), vec![article]);
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_identity() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());

        let original = sample_article("item", "2000-01-20T00:00:00Z");
        let mut edited = original.clone();
        // Older timestamp still wins: last write, not latest `updated`.
        edited.updated = original.updated - chrono::TimeDelta::days(3);
        edited.title = "Edited title".into();

        cache.put(&original).await.unwrap();
        cache.put(&edited).await.unwrap();

        assert_eq!(cache.get_all().await.unwrap(), vec![edited]);
    }

    #[tokio::test]
    async fn test_put_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path().join("nested").join("cache"));

        cache.put(&sample_article("a", "2000-01-15T00:00:00Z")).await.unwrap();
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path().join("absent"));

        assert!(cache.get_all().await.unwrap().is_empty());
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_empties_store() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());
        for id in ["a", "b", "c"] {
            cache.put(&sample_article(id, "2000-01-15T00:00:00Z")).await.unwrap();
        }
        std::fs::write(dir.path().join(".deadbeef.0000000000000001.tmp"), b"{").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        cache.clear().await.unwrap();

        assert!(cache.get_all().await.unwrap().is_empty());
        assert!(!dir.path().join(".deadbeef.0000000000000001.tmp").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());
        cache.put(&sample_article("ok", "2000-01-15T00:00:00Z")).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{\"id\": ").unwrap();

        let err = cache.get_all().await.unwrap_err();
        assert!(matches!(
            err,
            BulletinError::Storage { ref path, .. } if path.ends_with("broken.json")
        ));
    }

    #[tokio::test]
    async fn test_root_that_is_a_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let cache = ArticleCache::new(&file);

        assert!(matches!(cache.get_all().await, Err(BulletinError::Storage { .. })));
        assert!(matches!(
            cache.put(&sample_article("a", "2000-01-15T00:00:00Z")).await,
            Err(BulletinError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_temp_files_are_ignored_by_readers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());
        std::fs::write(dir.path().join(".abc.0000000000000002.tmp"), b"partial").unwrap();

        assert!(cache.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_puts_same_identity_leave_one_complete_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArticleCache::new(dir.path());

        let versions: Vec<Article> = (0..32)
            .map(|i| {
                let mut article = sample_article("contended", "2000-01-15T00:00:00Z");
                article.title = format!("version {i}");
                article.content = Some("x".repeat(4096 * (i + 1)));
                article
            })
            .collect();

        let results = join_all(versions.iter().map(|a| cache.put(a))).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let stored = cache.get_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(versions.contains(&stored[0]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
