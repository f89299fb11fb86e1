//! Run configuration.
//!
//! A [`RunConfig`] can be built in code or loaded from JSON. Every field
//! except `input` and `output_dir` has a default:
//!
//! ```no_run
//! use seqpack::config::RunConfig;
//!
//! let config = RunConfig::new("reads.fasta", "out")
//!     .with_workers(8)
//!     .with_option("preserve", "T");
//!
//! let from_file = RunConfig::from_json_file("run.json")?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ```json
//! { "input": "reads.fasta", "output_dir": "out", "workers": 8,
//!   "options": { "preserve": "T" } }
//! ```

use crate::io::compression::strip_codec_extension;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Default divisor of the skew term added to the per-worker capacity.
pub const DEFAULT_SKEW_DIVISOR: u64 = 20_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Input records (FASTA, optionally gzip/zstd compressed).
    pub input: PathBuf,
    /// Receives batch directories while running and merged outputs after.
    pub output_dir: PathBuf,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Basename for batch files, tool outputs and the summary. Defaults to
    /// the input file name without its extension.
    pub run_name: Option<String>,
    /// Options forwarded verbatim to the external computation.
    pub options: BTreeMap<String, String>,
    /// Capacity is inflated by `capacity / skew_divisor`; 0 disables it.
    pub skew_divisor: u64,
    /// Leave batch directories in place after a successful run.
    pub keep_work_dirs: bool,
    /// Extension of the serialized batch file inside each batch directory.
    pub batch_extension: String,
    /// Suffix of the per-batch and aggregated summary report.
    pub summary_suffix: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_dir: PathBuf::new(),
            workers: num_cpus::get().max(1),
            run_name: None,
            options: BTreeMap::new(),
            skew_divisor: DEFAULT_SKEW_DIVISOR,
            keep_work_dirs: false,
            batch_extension: "x".to_string(),
            summary_suffix: "summary.txt".to_string(),
        }
    }
}

impl RunConfig {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse run config {}", path.display()))
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_skew_divisor(mut self, divisor: u64) -> Self {
        self.skew_divisor = divisor;
        self
    }

    #[must_use]
    pub fn keep_work_dirs(mut self, keep: bool) -> Self {
        self.keep_work_dirs = keep;
        self
    }

    /// The explicit run name, or the input's base name without extension.
    ///
    /// `reads.fasta` and `reads.fasta.gz` both give `reads`.
    ///
    /// # Errors
    ///
    /// Returns an error if no name is set and none can be derived.
    pub fn resolved_run_name(&self) -> Result<String> {
        if let Some(name) = &self.run_name {
            return Ok(name.clone());
        }
        strip_codec_extension(&self.input)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a run name from {}", self.input.display()))
    }

    /// File name of the serialized batch inside each batch directory.
    #[must_use]
    pub fn batch_file_name(&self, run_name: &str) -> String {
        format!("{run_name}.{}", self.batch_extension)
    }

    /// File name of the summary report, per batch and aggregated.
    #[must_use]
    pub fn summary_file_name(&self, run_name: &str) -> String {
        format!("{run_name}.{}", self.summary_suffix)
    }

    /// Check the configuration before any work starts.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.input.as_os_str().is_empty() {
            bail!("no input file configured");
        }
        if !self.input.is_file() {
            bail!("input {} does not exist", self.input.display());
        }
        if self.output_dir.as_os_str().is_empty() {
            bail!("no output directory configured");
        }
        if self.batch_extension.is_empty() {
            bail!("batch_extension must not be empty");
        }
        if self.summary_suffix.is_empty() {
            bail!("summary_suffix must not be empty");
        }
        let name = self.resolved_run_name()?;
        if name.contains(['/', '\\']) {
            bail!("run name {name:?} must not contain path separators");
        }
        Ok(())
    }
}
