use anyhow::Result;
use seqpack::summary::{SummaryLine, SummaryReport, aggregate, aggregate_files};
use std::fs;
use tempfile::TempDir;

#[test]
fn counts_are_summed() -> Result<()> {
    let a = SummaryReport::parse("reads: 100\n");
    let b = SummaryReport::parse("reads: 50\n");
    let total = aggregate(&[a, b])?;
    assert_eq!(total.to_string(), "reads: 150\n");
    assert_eq!(total.get("reads"), Some(150));
    Ok(())
}

#[test]
fn single_report_comes_back_unchanged() -> Result<()> {
    let text = "Number of sequences in input file:   42\nRun finished\n";
    let report = SummaryReport::parse(text);
    assert_eq!(aggregate(std::slice::from_ref(&report))?, report);
    assert_eq!(report.to_string(), text);
    Ok(())
}

#[test]
fn padding_shrinks_to_the_narrowest_prefix() -> Result<()> {
    let a = SummaryReport::parse("reads:   5\n");
    let b = SummaryReport::parse("reads:  10\n");
    assert_eq!(aggregate(&[a, b])?.to_string(), "reads:  15\n");
    Ok(())
}

#[test]
fn text_lines_come_from_the_first_report() -> Result<()> {
    let a = SummaryReport::parse("Started\nhits = 3\nfirst\n");
    let b = SummaryReport::parse("Started\nhits = 4\nsecond\n");
    let c = SummaryReport::parse("Started\nhits = 5\nthird\n");
    assert_eq!(aggregate(&[a, b, c])?.to_string(), "Started\nhits = 12\nfirst\n");
    Ok(())
}

#[test]
fn line_parsing() {
    assert_eq!(
        SummaryLine::parse("Residues processed: 1000"),
        SummaryLine::Count {
            label: "Residues processed".into(),
            prefix: "Residues processed: ".into(),
            value: 1000,
        }
    );
    assert_eq!(
        SummaryLine::parse("total\t=\t7"),
        SummaryLine::Count {
            label: "total".into(),
            prefix: "total\t=\t".into(),
            value: 7,
        }
    );
    assert_eq!(
        SummaryLine::parse("Run finished"),
        SummaryLine::Text("Run finished".into())
    );
    assert_eq!(SummaryLine::parse("").value(), None);
    // Only the trailing digit run is the value.
    assert_eq!(SummaryLine::parse("ITS2 found: 12").value(), Some(12));
}

#[test]
fn oversized_numbers_are_text() {
    let line = SummaryLine::parse("bases: 99999999999999999999999");
    assert!(matches!(line, SummaryLine::Text(_)));
}

#[test]
fn differing_line_counts_are_rejected() {
    let a = SummaryReport::parse("reads: 1\nbases: 2\n");
    let b = SummaryReport::parse("reads: 1\n");
    let err = aggregate(&[a, b]).unwrap_err();
    assert!(format!("{err:#}").contains("expected 2"));
}

#[test]
fn differing_labels_are_rejected() {
    let a = SummaryReport::parse("reads: 1\n");
    let b = SummaryReport::parse("bases: 1\n");
    let err = aggregate(&[a, b]).unwrap_err();
    assert!(format!("{err:#}").contains("does not match"));
}

#[test]
fn numeric_against_text_is_rejected() {
    let a = SummaryReport::parse("reads: 1\n");
    let b = SummaryReport::parse("reads: none\n");
    let err = aggregate(&[a, b]).unwrap_err();
    assert!(format!("{err:#}").contains("numeric in one summary"));
}

#[test]
fn failed_merge_leaves_accumulator_untouched() {
    let mut acc = SummaryReport::parse("reads: 1\nbases: 2\n");
    let before = acc.clone();
    let bad = SummaryReport::parse("reads: 5\nother: 5\n");
    assert!(acc.merge(&bad).is_err());
    assert_eq!(acc, before);
}

#[test]
fn overflow_on_a_later_line_leaves_earlier_lines_untouched() {
    let mut acc = SummaryReport::parse(&format!("reads:   1\nbig: {}\n", u64::MAX));
    let before = acc.clone();
    let err = acc.merge(&SummaryReport::parse("reads: 5\nbig: 1\n")).unwrap_err();

    assert!(err.to_string().contains("line 2"));
    assert_eq!(acc, before);
    assert_eq!(acc.get("reads"), Some(1));
}

#[test]
fn overflow_is_an_error() {
    let a = SummaryReport::parse(&format!("n: {}\n", u64::MAX));
    let b = SummaryReport::parse("n: 1\n");
    let err = aggregate(&[a, b]).unwrap_err();
    assert!(format!("{err:#}").contains("overflows"));
}

#[test]
fn nothing_to_aggregate_is_an_error() {
    assert!(aggregate(&[]).is_err());
}

#[test]
fn files_are_read_summed_and_written() -> Result<()> {
    let tmp = TempDir::new()?;
    let paths: Vec<_> = (1..=3)
        .map(|i| -> Result<std::path::PathBuf> {
            let p = tmp.path().join(format!("{i}.summary.txt"));
            fs::write(&p, format!("Number of sequences:  {}\nRun finished", i * 10))?;
            Ok(p)
        })
        .collect::<Result<_>>()?;
    let dest = tmp.path().join("total.summary.txt");

    let total = aggregate_files(&paths, &dest)?;
    assert_eq!(total.get("Number of sequences"), Some(60));
    assert_eq!(
        fs::read_to_string(&dest)?,
        "Number of sequences:  60\nRun finished\n"
    );
    Ok(())
}

#[test]
fn missing_report_file_is_an_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let present = tmp.path().join("1.txt");
    fs::write(&present, "reads: 1\n")?;
    let absent = tmp.path().join("2.txt");
    let dest = tmp.path().join("out.txt");

    assert!(aggregate_files(&[present, absent], &dest).is_err());
    assert!(!dest.exists());
    Ok(())
}
