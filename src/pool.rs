//! Fixed-size pool of joinable worker threads.
//!
//! Each worker pops [`WorkItem`]s from a shared [`WorkQueue`], runs the
//! [`Computation`] on it with a thread hint of 1, reports a [`WorkOutcome`]
//! on an outcome channel and marks the item done. Parallelism comes from the
//! pool, not from the tool.
//!
//! Failure handling is explicit:
//! - a failing (or panicking) computation produces a `Failed` outcome and
//!   raises a shared cancellation flag;
//! - items popped after that are marked done without running (`Skipped`),
//!   so the join barrier always completes;
//! - [`WorkerPool::finish`] closes the queue, joins every thread and turns
//!   any failure into a [`WorkerFailures`] error.

use crate::queue::WorkQueue;
use crate::tool::{Computation, Invocation};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One batch waiting to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 1-based batch index.
    pub index: usize,
    /// Serialized batch file.
    pub input: PathBuf,
    pub work_dir: PathBuf,
}

/// Per-run values every invocation reads. Shared immutably by all workers.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub run_name: String,
    pub options: Arc<BTreeMap<String, String>>,
}

impl RunContext {
    pub fn new(run_name: impl Into<String>, options: BTreeMap<String, String>) -> Self {
        Self {
            run_name: run_name.into(),
            options: Arc::new(options),
        }
    }

    fn invocation(&self, item: &WorkItem) -> Invocation {
        Invocation {
            input: item.input.clone(),
            output_name: self.run_name.clone(),
            threads: 1,
            work_dir: item.work_dir.clone(),
            options: Arc::clone(&self.options),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Status {
    Completed,
    Failed(String),
    /// Not run because an earlier batch had already failed.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkOutcome {
    pub index: usize,
    pub worker: usize,
    pub status: Status,
    pub elapsed: Duration,
}

/// Every batch failure of a run, ordered by batch index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailures {
    pub failures: Vec<(usize, String)>,
    /// Worker threads that died outside the computation.
    pub crashed_workers: Vec<usize>,
}

impl fmt::Display for WorkerFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} batch(es) failed", self.failures.len())?;
        for (index, message) in &self.failures {
            write!(f, "\n  batch {index}: {message}")?;
        }
        for worker in &self.crashed_workers {
            write!(f, "\n  worker {worker} crashed")?;
        }
        Ok(())
    }
}

impl std::error::Error for WorkerFailures {}

pub struct WorkerPool {
    queue: Arc<WorkQueue<WorkItem>>,
    handles: Vec<JoinHandle<()>>,
    outcomes: Receiver<WorkOutcome>,
    cancelled: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Start `workers` threads, all blocked on an empty queue.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn spawn(
        workers: usize,
        computation: Arc<dyn Computation>,
        ctx: Arc<RunContext>,
    ) -> Result<Self> {
        let queue = Arc::new(WorkQueue::new());
        let cancelled = Arc::new(AtomicBool::new(false));
        let (outcome_tx, outcomes) = unbounded();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 1..=workers.max(1) {
            let worker = Worker {
                id: worker_id,
                queue: Arc::clone(&queue),
                computation: Arc::clone(&computation),
                ctx: Arc::clone(&ctx),
                outcomes: outcome_tx.clone(),
                cancelled: Arc::clone(&cancelled),
            };
            let spawned = thread::Builder::new()
                .name(format!("seqpack-worker-{worker_id}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Release the workers already started before bailing out.
                    queue.close();
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e).with_context(|| format!("spawn worker {worker_id}"));
                }
            }
        }
        log::debug!("started {} workers", handles.len());

        Ok(Self {
            queue,
            handles,
            outcomes,
            cancelled,
        })
    }

    /// Queue one batch for processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is no longer accepting work.
    pub fn submit(&self, item: WorkItem) -> Result<()> {
        log::trace!("queueing batch {}", item.index);
        self.queue.push(item)
    }

    /// Skip every item not yet started. Already running items finish normally.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether some batch has already failed or the pool was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Block until every submitted item is done.
    pub fn join(&self) {
        self.queue.join();
    }

    /// Wait for all work, shut the workers down and collect their outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerFailures`] if any batch failed or any worker crashed.
    pub fn finish(self) -> Result<Vec<WorkOutcome>> {
        self.queue.join();
        self.queue.close();

        let mut crashed_workers = Vec::new();
        for (i, handle) in self.handles.into_iter().enumerate() {
            if handle.join().is_err() {
                crashed_workers.push(i + 1);
            }
        }

        let mut outcomes: Vec<WorkOutcome> = self.outcomes.try_iter().collect();
        outcomes.sort_by_key(|o| o.index);

        let failures: Vec<(usize, String)> = outcomes
            .iter()
            .filter_map(|o| match &o.status {
                Status::Failed(msg) => Some((o.index, msg.clone())),
                _ => None,
            })
            .collect();

        if failures.is_empty() && crashed_workers.is_empty() {
            return Ok(outcomes);
        }
        Err(WorkerFailures {
            failures,
            crashed_workers,
        }
        .into())
    }
}

struct Worker {
    id: usize,
    queue: Arc<WorkQueue<WorkItem>>,
    computation: Arc<dyn Computation>,
    ctx: Arc<RunContext>,
    outcomes: Sender<WorkOutcome>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        while let Some(item) = self.queue.pop() {
            let started = Instant::now();
            let status = if self.cancelled.load(Ordering::Acquire) {
                log::debug!("worker {} skipping batch {}", self.id, item.index);
                Status::Skipped
            } else {
                self.process(&item)
            };
            if matches!(status, Status::Failed(_)) {
                self.cancelled.store(true, Ordering::Release);
            }

            // The pool owns the receiver until every worker is joined.
            let _ = self.outcomes.send(WorkOutcome {
                index: item.index,
                worker: self.id,
                status,
                elapsed: started.elapsed(),
            });
            if let Err(e) = self.queue.task_done() {
                log::error!("worker {}: {e:#}", self.id);
            }
        }
        log::trace!("worker {} exiting", self.id);
    }

    fn process(&self, item: &WorkItem) -> Status {
        log::debug!("worker {} processing batch {}", self.id, item.index);
        let invocation = self.ctx.invocation(item);
        match catch_unwind(AssertUnwindSafe(|| self.computation.run(&invocation))) {
            Ok(Ok(())) => {
                log::debug!("worker {} finished batch {}", self.id, item.index);
                Status::Completed
            }
            Ok(Err(e)) => {
                log::error!("batch {} failed: {e:#}", item.index);
                Status::Failed(format!("{e:#}"))
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "computation panicked".to_string());
                log::error!("batch {} panicked: {msg}", item.index);
                Status::Failed(format!("panic: {msg}"))
            }
        }
    }
}
