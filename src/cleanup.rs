//! Removal of per-batch working directories.

use anyhow::{Context, Result};
use std::fs::remove_dir_all;
use std::path::PathBuf;

/// Recursively delete every directory in `dirs`. Directories that are
/// already gone are skipped.
///
/// # Errors
///
/// Returns the first removal failure; directories after it are left in place.
pub fn remove_work_dirs(dirs: &[PathBuf]) -> Result<usize> {
    let mut removed = 0;
    for dir in dirs {
        if !dir.exists() {
            log::warn!("batch directory {} already removed", dir.display());
            continue;
        }
        remove_dir_all(dir).with_context(|| format!("rm -r {}", dir.display()))?;
        removed += 1;
    }
    log::debug!("removed {removed} batch directories");
    Ok(removed)
}
