//! Greedy next-fit bin packing of records into size-balanced batches.
//!
//! Records are taken in input order and appended to the open batch. As soon
//! as the batch's cumulative length reaches or exceeds the capacity, it is
//! closed and yielded, and the next record starts a new batch. Consequently:
//!
//! - no record is split, dropped or duplicated, and order is preserved;
//! - every batch except possibly the last has length `>= capacity`;
//! - at most `ceil(total / capacity) + 1` batches are produced.
//!
//! The capacity is a length budget, not a record count. With a capacity of
//! 500 and records of length 100, each batch holds five records:
//!
//! ```
//! use seqpack::batcher::pack;
//! use seqpack::record::SeqRecord;
//!
//! let records = (0..10).map(|i| SeqRecord::new(format!("r{i}"), vec![b'A'; 100]));
//! let batches: Vec<_> = pack(records, 500).collect();
//! assert_eq!(batches.len(), 2);
//! assert_eq!(batches[0].records.len(), 5);
//! assert_eq!(batches[1].index, 2);
//! ```

use crate::record::Record;
use std::convert::Infallible;

/// A contiguous, ordered group of records destined for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<R> {
    /// 1-based position of this batch in the output sequence.
    pub index: usize,
    pub records: Vec<R>,
    /// Sum of record lengths.
    pub length: u64,
}

impl<R> Batch<R> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lazy batch iterator over a fallible record source.
///
/// A source error is yielded once, after which the iterator is exhausted.
pub struct Batcher<I> {
    source: I,
    capacity: u64,
    next_index: usize,
    exhausted: bool,
}

impl<I> Batcher<I> {
    pub fn new(source: I, capacity: u64) -> Self {
        Self {
            source,
            capacity,
            next_index: 1,
            exhausted: false,
        }
    }

    /// The length budget each batch is filled to.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl<I, R, E> Iterator for Batcher<I>
where
    I: Iterator<Item = Result<R, E>>,
    R: Record,
{
    type Item = Result<Batch<R>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let mut records = Vec::new();
        let mut length = 0u64;
        loop {
            match self.source.next() {
                Some(Ok(rec)) => {
                    length += rec.len() as u64;
                    records.push(rec);
                    if length >= self.capacity {
                        break;
                    }
                }
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if records.is_empty() {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(Ok(Batch {
            index,
            records,
            length,
        }))
    }
}

/// Pack an infallible record sequence into batches of at least `capacity` length.
pub fn pack<R, T>(records: T, capacity: u64) -> impl Iterator<Item = Batch<R>>
where
    R: Record,
    T: IntoIterator<Item = R>,
{
    Batcher::new(records.into_iter().map(Ok::<R, Infallible>), capacity).map(|b| match b {
        Ok(batch) => batch,
        Err(never) => match never {},
    })
}

/// Per-worker length budget: `ceil(total / workers)`, inflated by
/// `capacity / skew_divisor` to absorb the overshoot of greedy packing.
///
/// A `skew_divisor` of zero disables the inflation.
#[must_use]
pub fn batch_capacity(total_length: u64, workers: usize, skew_divisor: u64) -> u64 {
    let workers = workers.max(1) as u64;
    let capacity = total_length.div_ceil(workers);
    match skew_divisor {
        0 => capacity,
        d => capacity + capacity / d,
    }
}
