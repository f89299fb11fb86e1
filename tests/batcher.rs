use anyhow::{Result, anyhow};
use seqpack::batcher::{Batcher, batch_capacity, pack};
use seqpack::record::{Record, SeqRecord};
use seqpack::testing::{records_with_lengths, synthetic_records};

fn ids<R: Record>(records: &[R]) -> Vec<String> {
    records.iter().map(|r| r.id().to_string()).collect()
}

fn uneven_lengths(n: usize) -> Vec<usize> {
    (0..n).map(|i| (i * 37) % 101 + 1).collect()
}

#[test]
fn ten_equal_records_split_in_two() {
    let batches: Vec<_> = pack(synthetic_records(10, 100), 500).collect();

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].index, 1);
    assert_eq!(batches[1].index, 2);
    assert_eq!(batches[0].len(), 5);
    assert_eq!(batches[1].len(), 5);
    assert_eq!(batches[0].length, 500);
    assert_eq!(batches[1].length, 500);
}

#[test]
fn batch_closes_once_capacity_is_reached() {
    // 40 + 40 = 80 < 100, third record pushes it to 120 and closes the batch.
    let records = records_with_lengths(&[40, 40, 40, 40, 40]);
    let batches: Vec<_> = pack(records, 100).collect();

    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![3, 2]);
    assert_eq!(batches[0].length, 120);
    assert_eq!(batches[1].length, 80);
}

#[test]
fn order_and_count_are_preserved() {
    let records = records_with_lengths(&uneven_lengths(250));
    let expected = ids(&records);

    for capacity in [1u64, 7, 50, 333, 1_000, 100_000] {
        let batches: Vec<_> = pack(records.clone(), capacity).collect();
        let flattened: Vec<SeqRecord> = batches.into_iter().flat_map(|b| b.records).collect();
        assert_eq!(ids(&flattened), expected, "capacity={capacity}");
    }
}

#[test]
fn only_last_batch_may_be_short() {
    let lengths = uneven_lengths(300);
    let total: u64 = lengths.iter().map(|&l| l as u64).sum();

    for capacity in [10u64, 99, 250, 1_234, 5_000] {
        let batches: Vec<_> = pack(records_with_lengths(&lengths), capacity).collect();
        let (last, rest) = batches.split_last().expect("at least one batch");

        for b in rest {
            assert!(b.length >= capacity, "batch {} short: {}", b.index, b.length);
        }
        assert!(last.length > 0);
        assert!(batches.len() as u64 <= total.div_ceil(capacity) + 1);
    }
}

#[test]
fn indices_are_one_based_and_contiguous() {
    let batches: Vec<_> = pack(synthetic_records(17, 10), 30).collect();
    let indices: Vec<usize> = batches.iter().map(|b| b.index).collect();
    assert_eq!(indices, (1..=batches.len()).collect::<Vec<_>>());
}

#[test]
fn huge_capacity_gives_one_batch() {
    let batches: Vec<_> = pack(synthetic_records(5, 10), u64::MAX).collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 5);
}

#[test]
fn empty_input_gives_no_batches() {
    assert_eq!(pack(Vec::<SeqRecord>::new(), 100).count(), 0);
}

#[test]
fn source_error_ends_iteration() {
    let source = vec![
        Ok(SeqRecord::new("a", vec![b'A'; 10])),
        Err(anyhow!("corrupt record")),
        Ok(SeqRecord::new("b", vec![b'A'; 10])),
    ];
    let mut batcher = Batcher::new(source.into_iter(), 100);

    let err = batcher.next().expect("an item").unwrap_err();
    assert!(err.to_string().contains("corrupt record"));
    assert!(batcher.next().is_none());
}

#[test]
fn fallible_source_without_errors() -> Result<()> {
    let source = synthetic_records(6, 10).into_iter().map(Ok::<_, anyhow::Error>);
    let batches = Batcher::new(source, 20).collect::<Result<Vec<_>>>()?;
    assert_eq!(batches.len(), 3);
    Ok(())
}

#[test]
fn capacity_is_ceiling_share() {
    assert_eq!(batch_capacity(1_000, 2, 0), 500);
    assert_eq!(batch_capacity(1_001, 2, 0), 501);
    assert_eq!(batch_capacity(10, 3, 0), 4);
    assert_eq!(batch_capacity(0, 4, 20_000), 0);
}

#[test]
fn capacity_includes_skew_term() {
    // 500 / 20000 rounds down to zero.
    assert_eq!(batch_capacity(1_000, 2, 20_000), 500);
    assert_eq!(batch_capacity(1_000_000, 1, 20_000), 1_000_050);
    assert_eq!(batch_capacity(4_000_000, 2, 20_000), 2_000_100);
    assert_eq!(batch_capacity(1_000_000, 1, 10), 1_100_000);
}

#[test]
fn zero_workers_treated_as_one() {
    assert_eq!(batch_capacity(900, 0, 0), 900);
}

#[test]
fn records_can_be_borrowed() {
    let records = synthetic_records(4, 25);
    let batches: Vec<_> = pack(records.iter(), 50).collect();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].records[0].id, "seq2");
}
