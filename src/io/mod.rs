//! File-level I/O: FASTA records, compressed inputs and batch output discovery.

pub mod compression;
pub mod fasta;
pub mod glob;
