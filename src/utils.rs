//! Small filesystem and logging helpers shared by the commands.

use crate::error::{BulletinError, Result};
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

const PROBE_FILE: &str = "..__probe_write__";

/// Truncate a string for logging purposes.
///
/// Long strings keep their first `max` characters and get a
/// `"…(+N bytes)"` marker for the rest.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Errors
///
/// [`BulletinError::Storage`] if the directory cannot be created or the
/// probe cannot be written (permissions, read-only filesystem, a plain file
/// in the way).
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| BulletinError::storage(path, e))?;

    let probe = path.join(PROBE_FILE);
    fs::write(&probe, b"")
        .await
        .map_err(|e| BulletinError::storage(&probe, e))?;
    if let Err(e) = fs::remove_file(&probe).await {
        warn!(probe = %probe.display(), error = %e, "Could not remove probe file");
    }

    info!("Directory is writable");
    Ok(())
}
