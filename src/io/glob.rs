//! Discovery of per-batch output files.
//!
//! After the join barrier, the set of files to merge is whatever the external
//! tool left in the first batch directory. Every batch runs the same tool on
//! the same kind of input, so batch 1 is representative of all of them.

use anyhow::{Context, Result, bail};
use glob::glob;
use std::path::{Path, PathBuf};

/// Expand a glob pattern into a sorted vector of matching regular files.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or a directory entry cannot be read.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut result = Vec::new();
    for entry in paths {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            result.push(path);
        }
    }
    result.sort();
    Ok(result)
}

/// List the file names in `batch_dir`, sorted, skipping any name in `exclude`.
///
/// Glob metacharacters in `batch_dir` are escaped, so run directories with
/// brackets or asterisks in their names are safe.
///
/// # Errors
///
/// Returns an error if `batch_dir` does not exist or cannot be listed.
pub fn batch_output_names(batch_dir: &Path, exclude: &[&str]) -> Result<Vec<String>> {
    if !batch_dir.is_dir() {
        bail!("batch directory {} does not exist", batch_dir.display());
    }
    let escaped = glob::Pattern::escape(&batch_dir.to_string_lossy());
    let pattern = format!("{escaped}/*");

    let mut names = Vec::new();
    for path in expand_glob(&pattern)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if exclude.contains(&name) {
            continue;
        }
        names.push(name.to_string());
    }
    Ok(names)
}
