//! End-to-end orchestration of a run.
//!
//! [`Dispatcher::run`] performs, in order:
//!
//! 1. validate the configuration and scan the input once for its total length;
//! 2. derive the per-batch capacity (`ceil(total / workers)` plus skew term);
//! 3. start the worker pool before any batch exists;
//! 4. pack records into batches, write each to `<output_dir>/<index>/<run>.x`
//!    and queue it, strictly in index order;
//! 5. wait on the join barrier, shut the pool down and surface any failure;
//! 6. merge per-batch outputs, then aggregate the summary reports;
//! 7. remove the batch directories.
//!
//! Any failure before step 7 returns an error and leaves the batch
//! directories on disk so the partial results can be inspected.
//!
//! ```no_run
//! use seqpack::config::RunConfig;
//! use seqpack::dispatcher::Dispatcher;
//! use seqpack::tool::ExternalTool;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = RunConfig::new("reads.fasta", "out").with_workers(8);
//! let report = Dispatcher::new(config, ExternalTool::new("ITSx")).run()?;
//! report.print();
//! # Ok(())
//! # }
//! ```

use crate::batcher::{Batcher, batch_capacity};
use crate::cleanup::remove_work_dirs;
use crate::config::RunConfig;
use crate::io::fasta::{open_fasta, total_length, write_fasta};
use crate::merge::merge_outputs;
use crate::pool::{RunContext, Status, WorkItem, WorkerPool};
use crate::report::{BatchStats, RunReport};
use crate::summary::aggregate_files;
use crate::tool::Computation;
use anyhow::{Context, Result, bail};
use std::fs::{create_dir_all, remove_dir_all};
use std::path::{Path, PathBuf, absolute};
use std::sync::Arc;
use std::time::Instant;

pub struct Dispatcher {
    config: RunConfig,
    computation: Arc<dyn Computation>,
}

impl Dispatcher {
    pub fn new(config: RunConfig, computation: impl Computation + 'static) -> Self {
        Self {
            config,
            computation: Arc::new(computation),
        }
    }

    /// Share one computation between several dispatchers.
    pub fn with_shared(config: RunConfig, computation: Arc<dyn Computation>) -> Self {
        Self {
            config,
            computation,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Execute the whole run.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the input cannot be
    /// read, a batch directory cannot be prepared, any batch fails, merging
    /// fails, aggregation fails, or cleanup fails.
    pub fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let cfg = &self.config;
        cfg.validate()?;
        let run_name = cfg.resolved_run_name()?;

        let (total, total_records) = total_length(&cfg.input)
            .with_context(|| format!("scan input {}", cfg.input.display()))?;
        let capacity = batch_capacity(total, cfg.workers, cfg.skew_divisor);
        log::info!(
            "run {}: {} records, {} residues, {} workers, capacity {}",
            run_name,
            total_records,
            total,
            cfg.workers,
            capacity
        );

        create_dir_all(&cfg.output_dir)
            .with_context(|| format!("mkdir -p {}", cfg.output_dir.display()))?;
        // The tool runs inside each batch directory, so every path it is
        // handed must be absolute.
        let output_dir = absolute(&cfg.output_dir)
            .with_context(|| format!("resolve {}", cfg.output_dir.display()))?;

        let ctx = Arc::new(RunContext::new(run_name.clone(), cfg.options.clone()));
        let pool = WorkerPool::spawn(cfg.workers, Arc::clone(&self.computation), ctx)?;

        let (batch_dirs, batches) =
            match self.materialize(&pool, &output_dir, &run_name, capacity) {
                Ok(done) => done,
                Err(e) => {
                    pool.cancel();
                    // Batches not yet started are skipped; running ones may still fail.
                    return Err(match pool.finish() {
                        Ok(_) => e,
                        Err(failures) => {
                            log::error!("batches already running also failed: {failures:#}");
                            e.context(format!("batches already running also failed: {failures}"))
                        }
                    });
                }
            };

        let outcomes = pool
            .finish()
            .with_context(|| format!("run {run_name}: batch processing failed"))?;
        let completed = outcomes
            .iter()
            .filter(|o| o.status == Status::Completed)
            .count();
        log::info!("{completed}/{} batches completed", batch_dirs.len());

        let batched: usize = batches.iter().map(|b| b.records).sum();
        if batched != total_records {
            bail!(
                "input changed while running: scanned {total_records} records but batched {batched}"
            );
        }

        let batch_file = cfg.batch_file_name(&run_name);
        let summary_file = cfg.summary_file_name(&run_name);
        let merged = merge_outputs(
            &batch_dirs,
            &output_dir,
            &[batch_file.as_str(), summary_file.as_str()],
        )?;

        let summary = if batch_dirs.is_empty() {
            None
        } else {
            let reports: Vec<PathBuf> = batch_dirs.iter().map(|d| d.join(&summary_file)).collect();
            let dest = output_dir.join(&summary_file);
            if let Err(e) = aggregate_files(&reports, &dest) {
                log::error!(
                    "summary aggregation failed, keeping {} batch directories: {e:#}",
                    batch_dirs.len()
                );
                return Err(e.context("summary aggregation failed"));
            }
            log::info!("wrote {}", dest.display());
            Some(dest)
        };

        if cfg.keep_work_dirs {
            log::info!("keeping {} batch directories", batch_dirs.len());
        } else {
            remove_work_dirs(&batch_dirs)?;
        }

        Ok(RunReport {
            run_name,
            workers: cfg.workers,
            capacity,
            total_length: total,
            total_records,
            batches,
            merged_files: merged.into_iter().map(|m| m.path).collect(),
            summary,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Write every batch to its own directory and queue it, in index order.
    fn materialize(
        &self,
        pool: &WorkerPool,
        output_dir: &Path,
        run_name: &str,
        capacity: u64,
    ) -> Result<(Vec<PathBuf>, Vec<BatchStats>)> {
        let cfg = &self.config;
        let batch_file = cfg.batch_file_name(run_name);
        let mut dirs = Vec::new();
        let mut stats = Vec::new();

        for batch in Batcher::new(open_fasta(&cfg.input)?, capacity) {
            let batch = batch.with_context(|| format!("parse {}", cfg.input.display()))?;
            let work_dir = output_dir.join(batch.index.to_string());
            prepare_work_dir(&work_dir)?;

            let input = work_dir.join(&batch_file);
            write_fasta(&input, &batch.records)?;
            log::debug!(
                "batch {}: {} records, {} residues -> {}",
                batch.index,
                batch.len(),
                batch.length,
                input.display()
            );

            pool.submit(WorkItem {
                index: batch.index,
                input,
                work_dir: work_dir.clone(),
            })?;
            dirs.push(work_dir);
            stats.push(BatchStats {
                index: batch.index,
                records: batch.len(),
                length: batch.length,
            });
        }
        Ok((dirs, stats))
    }
}

/// Create an empty batch directory, clearing leftovers from an earlier run.
fn prepare_work_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        log::warn!("replacing stale batch directory {}", dir.display());
        remove_dir_all(dir).with_context(|| format!("rm -r {}", dir.display()))?;
    }
    create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))
}
