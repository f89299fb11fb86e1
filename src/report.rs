//! What a run did, for logging and for callers that want numbers.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Size of one materialized batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub index: usize,
    pub records: usize,
    pub length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_name: String,
    pub workers: usize,
    /// Per-batch length budget, skew term included.
    pub capacity: u64,
    pub total_length: u64,
    pub total_records: usize,
    pub batches: Vec<BatchStats>,
    pub merged_files: Vec<PathBuf>,
    /// Aggregated summary report, if any batch ran.
    pub summary: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl RunReport {
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Records across all batches; equals `total_records` for a complete run.
    #[must_use]
    pub fn batched_records(&self) -> usize {
        self.batches.iter().map(|b| b.records).sum()
    }

    /// Print a short human-readable digest to stdout.
    pub fn print(&self) {
        println!("\n========== Run {} ==========", self.run_name);
        println!(
            "{} records ({} residues) in {} batches on {} workers, capacity {}",
            self.total_records,
            self.total_length,
            self.batches.len(),
            self.workers,
            self.capacity
        );
        for b in &self.batches {
            println!("  batch {:>4}: {:>8} records {:>12} residues", b.index, b.records, b.length);
        }
        for f in &self.merged_files {
            println!("  merged {}", f.display());
        }
        if let Some(summary) = &self.summary {
            println!("  summary {}", summary.display());
        }
        println!("Elapsed: {} ms", self.elapsed_ms);
    }

    /// Save the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let formatted = serde_json::to_string_pretty(self)?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}
