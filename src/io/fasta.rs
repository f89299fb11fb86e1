//! FASTA reading and writing on top of [`seq_io::fasta`].
//!
//! Reading is lazy: [`FastaReader`] yields one [`SeqRecord`] at a time, so a
//! multi-gigabyte input is never held in memory. A reader cannot be rewound;
//! restart a pass by calling [`open_fasta`] again.
//!
//! ```no_run
//! use seqpack::io::fasta::{open_fasta, write_fasta};
//! # fn main() -> anyhow::Result<()> {
//! let records = open_fasta("reads.fasta")?.collect::<anyhow::Result<Vec<_>>>()?;
//! write_fasta("copy.fasta", &records)?;
//! # Ok(())
//! # }
//! ```

use crate::io::compression::auto_detect_reader;
use crate::record::{Record, SeqRecord};
use anyhow::{Context, Result};
use seq_io::fasta::{self, Record as _};
use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Residues per sequence line when writing.
pub const LINE_WIDTH: usize = 60;

/// Streaming FASTA parser over any byte source, yielding owned records.
///
/// Parsing is delegated to [`seq_io::fasta::Reader`]; this type only turns
/// its borrowed records into [`SeqRecord`]s and stops after the first error.
pub struct FastaReader<R: Read> {
    inner: fasta::Reader<R>,
    done: bool,
}

impl<R: Read> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: fasta::Reader::new(reader),
            done: false,
        }
    }
}

impl<R: Read> Iterator for FastaReader<R> {
    type Item = Result<SeqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.inner.next() {
            Some(Ok(rec)) => Ok(to_seq_record(rec.head(), rec.owned_seq())),
            Some(Err(e)) => Err(anyhow::Error::new(e).context("parse FASTA record")),
            None => {
                self.done = true;
                return None;
            }
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

/// Split a header line (without `>`) into id and description.
fn to_seq_record(head: &[u8], seq: Vec<u8>) -> SeqRecord {
    let head = String::from_utf8_lossy(head);
    let head = head.trim_end();
    let (id, description) = match head.split_once(char::is_whitespace) {
        Some((id, rest)) => (id.to_string(), rest.trim().to_string()),
        None => (head.to_string(), String::new()),
    };
    SeqRecord { id, description, seq }
}

/// Open a FASTA file for lazy reading, decompressing gzip/zstd input transparently.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its codec cannot be initialised.
pub fn open_fasta(path: impl AsRef<Path>) -> Result<FastaReader<Box<dyn Read>>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = auto_detect_reader(f, path)?;
    Ok(FastaReader::new(reader))
}

/// Sum the lengths of every record in `path`, along with the record count.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed.
pub fn total_length(path: impl AsRef<Path>) -> Result<(u64, usize)> {
    let path = path.as_ref();
    let mut total = 0u64;
    let mut count = 0usize;
    for rec in open_fasta(path)? {
        let rec = rec.with_context(|| format!("parse {}", path.display()))?;
        total += rec.len() as u64;
        count += 1;
    }
    Ok((total, count))
}

/// Write records as FASTA, wrapping sequence lines at [`LINE_WIDTH`].
/// Creates parent directories if needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_fasta(path: impl AsRef<Path>, records: &[SeqRecord]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    write_records(&mut w, records).with_context(|| format!("write {}", path.display()))?;
    w.flush().with_context(|| format!("flush {}", path.display()))?;
    Ok(records.len())
}

/// Serialize records to any writer.
///
/// # Errors
///
/// Propagates I/O errors from the writer.
pub fn write_records<W: Write>(w: &mut W, records: &[SeqRecord]) -> std::io::Result<()> {
    for rec in records {
        if rec.description.is_empty() {
            writeln!(w, ">{}", rec.id)?;
        } else {
            writeln!(w, ">{} {}", rec.id, rec.description)?;
        }
        fasta::write_wrap_seq(&mut *w, &rec.seq, LINE_WIDTH)?;
    }
    Ok(())
}
