//! The per-batch external computation.
//!
//! Workers know nothing about what a batch is turned into. They hand an
//! [`Invocation`] to a [`Computation`] and wait for it to return. The
//! production implementation is [`ExternalTool`], which runs a program in the
//! batch directory; tests and embedders can pass any closure instead.
//!
//! ```no_run
//! use seqpack::tool::{Computation, ExternalTool, Invocation};
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! let tool = ExternalTool::new("ITSx");
//! let inv = Invocation {
//!     input: "out/1/reads.x".into(),
//!     output_name: "reads".into(),
//!     threads: 1,
//!     work_dir: "out/1".into(),
//!     options: Arc::new(BTreeMap::from([("preserve".to_string(), "T".to_string())])),
//! };
//! tool.run(&inv)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

/// Bytes of stderr kept in a failure message.
const STDERR_TAIL: usize = 2048;

/// Everything the computation needs to process one batch.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Serialized batch file.
    pub input: PathBuf,
    /// Basename the computation should give its result files.
    pub output_name: String,
    /// Thread hint; the pool already runs one invocation per worker.
    pub threads: usize,
    /// Directory the computation runs in and writes to.
    pub work_dir: PathBuf,
    /// Pass-through options, forwarded verbatim.
    pub options: Arc<BTreeMap<String, String>>,
}

/// An opaque per-batch computation.
///
/// Implementations must be callable from several worker threads at once;
/// each call gets its own working directory.
pub trait Computation: Send + Sync {
    /// Process one batch. An error marks the batch as failed and aborts the run.
    fn run(&self, invocation: &Invocation) -> Result<()>;
}

impl<F> Computation for F
where
    F: Fn(&Invocation) -> Result<()> + Send + Sync,
{
    fn run(&self, invocation: &Invocation) -> Result<()> {
        self(invocation)
    }
}

/// Runs an external program once per batch:
/// `<program> <input_flag> <input> <output_flag> <name> <threads_flag> <n> [--key value]...`
#[derive(Debug, Clone)]
pub struct ExternalTool {
    pub program: PathBuf,
    pub input_flag: String,
    pub output_flag: String,
    pub threads_flag: String,
    /// Arguments placed before the per-batch ones.
    pub leading_args: Vec<String>,
}

impl ExternalTool {
    /// A tool using the `-i`/`-o`/`--cpu` flag convention.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            input_flag: "-i".into(),
            output_flag: "-o".into(),
            threads_flag: "--cpu".into(),
            leading_args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Full argument list for one invocation, program excluded.
    #[must_use]
    pub fn args(&self, inv: &Invocation) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push(self.input_flag.clone());
        args.push(inv.input.to_string_lossy().into_owned());
        args.push(self.output_flag.clone());
        args.push(inv.output_name.clone());
        args.push(self.threads_flag.clone());
        args.push(inv.threads.to_string());
        for (key, value) in inv.options.iter() {
            args.push(option_flag(key));
            if !value.is_empty() {
                args.push(value.clone());
            }
        }
        args
    }

    fn command(&self, inv: &Invocation) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(inv)).current_dir(&inv.work_dir);
        cmd
    }
}

impl Computation for ExternalTool {
    fn run(&self, inv: &Invocation) -> Result<()> {
        log::debug!(
            "running {} in {}",
            self.program.display(),
            inv.work_dir.display()
        );
        let output = self
            .command(inv)
            .output()
            .with_context(|| format!("spawn {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr.len().saturating_sub(STDERR_TAIL);
            let start = (start..stderr.len())
                .find(|&i| stderr.is_char_boundary(i))
                .unwrap_or(stderr.len());
            bail!(
                "{} failed ({}) on {}: {}",
                self.program.display(),
                output.status,
                inv.input.display(),
                stderr[start..].trim()
            );
        }
        Ok(())
    }
}

/// `preserve` becomes `--preserve`; keys already carrying dashes are kept.
fn option_flag(key: &str) -> String {
    if key.starts_with('-') {
        key.to_string()
    } else {
        format!("--{key}")
    }
}
