//! # seqpack
//!
//! Parallel fan-out of a large sequence file to an external per-batch tool.
//!
//! The input is packed into size-balanced batches, one per worker, each
//! written to its own working directory. A fixed pool of workers runs the
//! tool on every batch; once all of them are done, the per-batch outputs are
//! stitched back together in batch order and the per-batch summary reports
//! are summed into one.
//!
//! ## Quick Start
//!
//! ```no_run
//! use seqpack::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = RunConfig::new("reads.fasta", "out")
//!     .with_workers(8)
//!     .with_option("preserve", "T");
//!
//! let report = Dispatcher::new(config, ExternalTool::new("ITSx")).run()?;
//! println!("{} batches, summary at {:?}", report.batch_count(), report.summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## Run Layout
//!
//! While running, `<output_dir>/<n>/` holds batch `n` (1-based): the
//! serialized records `<run>.x` plus whatever the tool writes. Afterwards
//! `<output_dir>/<file>` holds each merged output and
//! `<output_dir>/<run>.summary.txt` the aggregated report; the batch
//! directories are removed.
//!
//! ## Failure Semantics
//!
//! - Unreadable input or an unwritable batch directory aborts before or
//!   while batches are queued.
//! - A failing batch cancels the batches not yet started; the run returns a
//!   [`WorkerFailures`] error naming every failed batch. Nothing is merged.
//! - Merge and aggregation failures are returned as errors, and the batch
//!   directories are kept for inspection.
//!
//! ## Module Overview
//!
//! - [`batcher`] - greedy next-fit packing of records into batches
//! - [`queue`] - FIFO work queue with a completion barrier
//! - [`pool`] - joinable worker threads and failure collection
//! - [`tool`] - the per-batch computation and its process-backed form
//! - [`merge`] - ordered byte concatenation of batch outputs
//! - [`summary`] - parsing and summation of summary reports
//! - [`dispatcher`] - the end-to-end run
//! - [`io`] - FASTA, compressed input, output discovery
//! - [`testing`] - fixtures and stand-in tools for tests

pub mod batcher;
pub mod cleanup;
pub mod config;
pub mod dispatcher;
pub mod io;
pub mod merge;
pub mod pool;
pub mod queue;
pub mod record;
pub mod report;
pub mod summary;
pub mod testing;
pub mod tool;

pub use batcher::{Batch, Batcher, batch_capacity, pack};
pub use config::RunConfig;
pub use dispatcher::Dispatcher;
pub use pool::{RunContext, Status, WorkItem, WorkOutcome, WorkerFailures, WorkerPool};
pub use queue::WorkQueue;
pub use record::{Record, SeqRecord};
pub use report::{BatchStats, RunReport};
pub use summary::{SummaryLine, SummaryReport, aggregate};
pub use tool::{Computation, ExternalTool, Invocation};
