//! Test support: synthetic inputs and stand-in computations.
//!
//! Real runs shell out to an external tool. For tests, [`CopyTool`] plays
//! that role in-process: it copies the batch through, lists the record ids
//! and writes a summary report with counts, which is enough to check merge
//! order and aggregation end to end.
//!
//! ```
//! use seqpack::config::RunConfig;
//! use seqpack::dispatcher::Dispatcher;
//! use seqpack::testing::{CopyTool, TestWorkspace, synthetic_records};
//!
//! # fn main() -> anyhow::Result<()> {
//! let ws = TestWorkspace::new()?;
//! let input = ws.write_input("reads.fasta", &synthetic_records(10, 100))?;
//! let config = RunConfig::new(input, ws.output_dir()).with_workers(2);
//! let report = Dispatcher::new(config, CopyTool).run()?;
//! assert_eq!(report.batch_count(), 2);
//! # Ok(())
//! # }
//! ```

use crate::io::compression::auto_detect_writer;
use crate::io::fasta::{open_fasta, write_fasta, write_records};
use crate::record::{Record, SeqRecord};
use crate::tool::{Computation, Invocation};
use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BASES: &[u8] = b"ACGT";

/// `n` records named `seq0..seq{n-1}`, each `len` residues long.
#[must_use]
pub fn synthetic_records(n: usize, len: usize) -> Vec<SeqRecord> {
    (0..n)
        .map(|i| {
            let seq = (0..len).map(|j| BASES[(i + j) % BASES.len()]).collect::<Vec<_>>();
            SeqRecord::new(format!("seq{i}"), seq)
        })
        .collect()
}

/// Records with the given lengths, named `seq0..`.
#[must_use]
pub fn records_with_lengths(lengths: &[usize]) -> Vec<SeqRecord> {
    lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| SeqRecord::new(format!("seq{i}"), vec![b'N'; len]))
        .collect()
}

/// A temporary directory holding an input area and an output directory.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("create temp dir")?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where runs should write; not created until a run needs it.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Write `records` as FASTA under the workspace, compressed if `name`
    /// ends in a codec extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_input(&self, name: &str, records: &[SeqRecord]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        let f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let mut w = auto_detect_writer(f, &path)?;
        write_records(&mut w, records)?;
        w.flush()?;
        Ok(path)
    }

    /// Write raw text under the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_text(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// In-process stand-in for the external tool.
///
/// For input `<dir>/<x>` and output name `n` it writes, into the working directory:
/// - `n.fasta`: the batch records, re-serialized;
/// - `n.ids.txt`: one record id per line;
/// - `n.summary.txt`: record and residue counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyTool;

impl Computation for CopyTool {
    fn run(&self, inv: &Invocation) -> Result<()> {
        if inv.threads != 1 {
            bail!("expected a thread hint of 1, got {}", inv.threads);
        }
        let records = open_fasta(&inv.input)?.collect::<Result<Vec<_>>>()?;
        let residues: usize = records.iter().map(|r| r.len()).sum();

        let out = |suffix: &str| inv.work_dir.join(format!("{}.{suffix}", inv.output_name));
        write_fasta(out("fasta"), &records)?;

        let ids: String = records.iter().map(|r| format!("{}\n", r.id)).collect();
        fs::write(out("ids.txt"), ids)?;

        let summary = format!(
            "Number of sequences in input file:   {}\nResidues processed: {}\nRun finished\n",
            records.len(),
            residues
        );
        fs::write(out("summary.txt"), summary)?;
        Ok(())
    }
}

/// [`CopyTool`] that fails on chosen batch indices (read from the working
/// directory name).
#[derive(Debug, Clone, Default)]
pub struct FailingTool {
    pub fail_on: BTreeSet<usize>,
}

impl FailingTool {
    pub fn on(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_on: indices.into_iter().collect(),
        }
    }
}

impl Computation for FailingTool {
    fn run(&self, inv: &Invocation) -> Result<()> {
        let index = inv
            .work_dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<usize>().ok());
        if let Some(index) = index
            && self.fail_on.contains(&index)
        {
            bail!("simulated failure on batch {index}");
        }
        CopyTool.run(inv)
    }
}
