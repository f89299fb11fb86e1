//! Length-bearing input records.
//!
//! The batcher only needs two things from a record: something to call it by
//! in logs and diagnostics, and a length to pack against the capacity. The
//! [`Record`] trait captures exactly that, and [`SeqRecord`] is the concrete
//! sequence entry produced by the FASTA reader in [`crate::io::fasta`].

use serde::{Deserialize, Serialize};

/// A unit of input with a stable identity and a known length.
pub trait Record {
    /// Identifier of this record within its input.
    fn id(&self) -> &str;

    /// Length used when packing records into batches.
    fn len(&self) -> usize;

    /// Whether this record has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One sequence entry: identifier, optional free-text description and residues.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeqRecord {
    pub id: String,
    pub description: String,
    pub seq: Vec<u8>,
}

impl SeqRecord {
    /// Build a record with an empty description.
    pub fn new(id: impl Into<String>, seq: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            seq: seq.into(),
        }
    }

    /// Attach a description (the header text following the identifier).
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Record for SeqRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> usize {
        self.seq.len()
    }
}

impl<R: Record + ?Sized> Record for &R {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
