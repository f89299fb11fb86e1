//! Ordered byte-level concatenation of per-batch outputs.
//!
//! For every output file name, the destination `<output_dir>/<name>` becomes
//! the concatenation of `<batch_dir>/<name>` over all batch directories in
//! the order given (ascending batch index). Files are copied in 1 MiB blocks
//! and never parsed, so any output format the tool produces merges correctly
//! as long as it is concatenable.
//!
//! A failure part-way through leaves the destination truncated; there is no
//! recovery beyond reporting which file and batch were involved.

use crate::io::glob::batch_output_names;
use anyhow::{Context, Result, bail};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Copy block size.
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Result of merging one output name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFile {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Append the contents of `src` to `dst` in [`BLOCK_SIZE`] reads.
///
/// # Errors
///
/// Propagates read and write failures.
pub fn append_file<W: Write>(dst: &mut W, src: &Path, buf: &mut [u8]) -> Result<u64> {
    let mut input = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let mut copied = 0u64;
    loop {
        let n = input
            .read(buf)
            .with_context(|| format!("read {}", src.display()))?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
        copied += n as u64;
    }
    Ok(copied)
}

/// Concatenate `name` from every batch directory into `dest`, truncating it first.
///
/// # Errors
///
/// Returns an error if `name` is missing from any batch directory or on I/O failure.
pub fn merge_file(batch_dirs: &[PathBuf], name: &str, dest: &Path) -> Result<u64> {
    let mut out = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest)
        .with_context(|| format!("create {}", dest.display()))?;

    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;
    for dir in batch_dirs {
        let src = dir.join(name);
        if !src.is_file() {
            bail!("{} is missing from batch directory {}", name, dir.display());
        }
        total += append_file(&mut out, &src, &mut buf)
            .with_context(|| format!("append {} to {}", src.display(), dest.display()))?;
    }
    out.flush()
        .with_context(|| format!("flush {}", dest.display()))?;
    Ok(total)
}

/// Merge every output found in the first batch directory, except `exclude`.
///
/// `batch_dirs` must be in ascending batch order. An empty list merges nothing.
///
/// # Errors
///
/// Returns the first I/O failure; earlier destinations are left in place.
pub fn merge_outputs(
    batch_dirs: &[PathBuf],
    output_dir: &Path,
    exclude: &[&str],
) -> Result<Vec<MergedFile>> {
    let Some(first) = batch_dirs.first() else {
        return Ok(Vec::new());
    };

    let mut merged = Vec::new();
    for name in batch_output_names(first, exclude)? {
        let path = output_dir.join(&name);
        let bytes = merge_file(batch_dirs, &name, &path)?;
        log::info!(
            "merged {} from {} batches ({} bytes)",
            name,
            batch_dirs.len(),
            bytes
        );
        merged.push(MergedFile { name, path, bytes });
    }
    Ok(merged)
}
