use anyhow::Result;
use seqpack::config::RunConfig;
use seqpack::dispatcher::Dispatcher;
use seqpack::io::fasta::open_fasta;
use seqpack::pool::WorkerFailures;
use seqpack::summary::SummaryReport;
use seqpack::testing::{CopyTool, FailingTool, TestWorkspace, records_with_lengths, synthetic_records};
use seqpack::tool::{Computation, ExternalTool, Invocation};
use std::fs;
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn ten_reads_on_two_workers() -> Result<()> {
    init_logging();
    let ws = TestWorkspace::new()?;
    let records = synthetic_records(10, 100);
    let input = ws.write_input("reads.fasta", &records)?;
    let out = ws.output_dir();

    let report = Dispatcher::new(RunConfig::new(&input, &out).with_workers(2), CopyTool).run()?;

    assert_eq!(report.run_name, "reads");
    assert_eq!(report.capacity, 500);
    assert_eq!(report.total_length, 1_000);
    assert_eq!(report.batch_count(), 2);
    assert_eq!(report.batches[0].records, 5);
    assert_eq!(report.batches[1].records, 5);
    assert_eq!(report.batched_records(), 10);

    // Concatenating the re-serialized batches in order reproduces the input.
    assert_eq!(fs::read(out.join("reads.fasta"))?, fs::read(&input)?);
    let ids = fs::read_to_string(out.join("reads.ids.txt"))?;
    let expected: String = (0..10).map(|i| format!("seq{i}\n")).collect();
    assert_eq!(ids, expected);

    let summary = SummaryReport::read(out.join("reads.summary.txt"))?;
    assert_eq!(summary.get("Number of sequences in input file"), Some(10));
    assert_eq!(summary.get("Residues processed"), Some(1_000));
    assert!(summary.to_string().ends_with("Run finished\n"));
    assert_eq!(report.summary, Some(out.join("reads.summary.txt")));

    assert!(!out.join("1").exists());
    assert!(!out.join("2").exists());
    assert!(!out.join("reads.x").exists());
    Ok(())
}

#[test]
fn merged_outputs_are_listed_in_report() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(6, 50))?;
    let out = ws.output_dir();

    let report = Dispatcher::new(RunConfig::new(&input, &out).with_workers(3), CopyTool).run()?;

    let mut merged = report.merged_files.clone();
    merged.sort();
    assert_eq!(merged, vec![out.join("reads.fasta"), out.join("reads.ids.txt")]);
    Ok(())
}

#[test]
fn more_workers_than_records() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(3, 40))?;
    let out = ws.output_dir();

    let report = Dispatcher::new(RunConfig::new(&input, &out).with_workers(8), CopyTool).run()?;

    assert_eq!(report.batch_count(), 3);
    let summary = SummaryReport::read(out.join("reads.summary.txt"))?;
    assert_eq!(summary.get("Number of sequences in input file"), Some(3));
    Ok(())
}

#[test]
fn uneven_records_keep_order() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let lengths: Vec<usize> = (0..40).map(|i| (i * 53) % 97 + 3).collect();
    let records = records_with_lengths(&lengths);
    let input = ws.write_input("mixed.fasta", &records)?;
    let out = ws.output_dir();

    let report = Dispatcher::new(RunConfig::new(&input, &out).with_workers(4), CopyTool).run()?;

    let back = open_fasta(out.join("mixed.fasta"))?.collect::<Result<Vec<_>>>()?;
    assert_eq!(back, records);
    let (last, rest) = report.batches.split_last().expect("batches");
    assert!(rest.iter().all(|b| b.length >= report.capacity));
    assert!(last.length > 0);
    Ok(())
}

#[test]
fn failing_batch_aborts_before_merge() -> Result<()> {
    init_logging();
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(10, 100))?;
    let out = ws.output_dir();

    let err = Dispatcher::new(
        RunConfig::new(&input, &out).with_workers(2),
        FailingTool::on([2]),
    )
    .run()
    .unwrap_err();

    let failures = err
        .downcast_ref::<WorkerFailures>()
        .expect("WorkerFailures in the chain");
    assert_eq!(failures.failures.len(), 1);
    assert_eq!(failures.failures[0].0, 2);
    assert!(failures.failures[0].1.contains("simulated failure"));

    assert!(!out.join("reads.fasta").exists());
    assert!(!out.join("reads.summary.txt").exists());
    assert!(out.join("1").is_dir());
    assert!(out.join("2").is_dir());
    Ok(())
}

#[test]
fn aggregation_failure_keeps_batch_dirs() -> Result<()> {
    init_logging();
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(10, 100))?;
    let out = ws.output_dir();

    let tool = |inv: &Invocation| -> Result<()> {
        CopyTool.run(inv)?;
        if inv.work_dir.ends_with("2") {
            fs::remove_file(inv.work_dir.join(format!("{}.summary.txt", inv.output_name)))?;
        }
        Ok(())
    };
    let err = Dispatcher::new(RunConfig::new(&input, &out).with_workers(2), tool)
        .run()
        .unwrap_err();

    assert!(format!("{err:#}").contains("summary aggregation failed"));
    assert!(out.join("1").is_dir());
    assert!(out.join("2").is_dir());
    assert!(out.join("reads.fasta").exists());
    assert!(!out.join("reads.summary.txt").exists());
    Ok(())
}

#[test]
fn mismatched_summaries_fail_the_run() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(4, 10))?;
    let out = ws.output_dir();

    let tool = |inv: &Invocation| -> Result<()> {
        let label = if inv.work_dir.ends_with("1") { "reads" } else { "bases" };
        fs::write(
            inv.work_dir.join(format!("{}.summary.txt", inv.output_name)),
            format!("{label}: 1\n"),
        )?;
        Ok(())
    };
    let err = Dispatcher::new(RunConfig::new(&input, &out).with_workers(2), tool)
        .run()
        .unwrap_err();

    assert!(format!("{err:#}").contains("does not match"));
    assert!(out.join("2").is_dir());
    Ok(())
}

#[test]
fn empty_input_produces_no_batches() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_text("empty.fasta", "")?;
    let out = ws.output_dir();

    let report = Dispatcher::new(RunConfig::new(&input, &out).with_workers(4), CopyTool).run()?;

    assert_eq!(report.batch_count(), 0);
    assert!(report.merged_files.is_empty());
    assert_eq!(report.summary, None);
    assert!(!out.join("empty.summary.txt").exists());
    Ok(())
}

#[test]
fn keep_work_dirs_leaves_batches() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(10, 100))?;
    let out = ws.output_dir();

    let cfg = RunConfig::new(&input, &out)
        .with_workers(2)
        .with_run_name("its")
        .keep_work_dirs(true);
    Dispatcher::new(cfg, CopyTool).run()?;

    assert!(out.join("1/its.x").is_file());
    assert!(out.join("2/its.summary.txt").is_file());
    assert!(out.join("its.fasta").is_file());
    Ok(())
}

#[test]
fn stale_batch_directory_is_replaced() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(10, 100))?;
    let out = ws.output_dir();
    fs::create_dir_all(out.join("1"))?;
    fs::write(out.join("1/reads.leftover"), "old")?;

    Dispatcher::new(RunConfig::new(&input, &out).with_workers(2), CopyTool).run()?;

    assert!(!out.join("reads.leftover").exists());
    assert!(out.join("reads.fasta").exists());
    Ok(())
}

#[test]
fn options_reach_the_computation() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(4, 25))?;
    let out = ws.output_dir();

    let tool = |inv: &Invocation| -> Result<()> {
        anyhow::ensure!(inv.options.get("preserve").map(String::as_str) == Some("T"));
        CopyTool.run(inv)
    };
    let cfg = RunConfig::new(&input, &out)
        .with_workers(2)
        .with_option("preserve", "T");
    Dispatcher::new(cfg, tool).run()?;
    Ok(())
}

#[test]
fn shared_computation_runs_twice() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(8, 30))?;
    let shared: Arc<dyn Computation> = Arc::new(CopyTool);

    for name in ["a", "b"] {
        let out = ws.path().join(name);
        let cfg = RunConfig::new(&input, &out).with_workers(2);
        let report = Dispatcher::with_shared(cfg, Arc::clone(&shared)).run()?;
        assert_eq!(report.batched_records(), 8);
    }
    Ok(())
}

#[test]
fn invalid_config_fails_before_any_work() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let out = ws.output_dir();
    let cfg = RunConfig::new(ws.path().join("absent.fasta"), &out);

    assert!(Dispatcher::new(cfg, CopyTool).run().is_err());
    assert!(!out.exists());
    Ok(())
}

#[test]
fn malformed_input_fails_the_scan() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_text("bad.fasta", "ACGT\n>a\nAC\n")?;
    let out = ws.output_dir();

    let err = Dispatcher::new(RunConfig::new(&input, &out), CopyTool)
        .run()
        .unwrap_err();
    assert!(format!("{err:#}").contains("bad.fasta"));
    assert!(!out.exists());
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_input_end_to_end() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let records = synthetic_records(12, 80);
    let input = ws.write_input("reads.fasta.gz", &records)?;
    let out = ws.output_dir();

    let report = Dispatcher::new(RunConfig::new(&input, &out).with_workers(3), CopyTool).run()?;

    assert_eq!(report.run_name, "reads");
    let back = open_fasta(out.join("reads.fasta"))?.collect::<Result<Vec<_>>>()?;
    assert_eq!(back, records);
    Ok(())
}

#[test]
fn report_is_saved_as_json() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(4, 10))?;
    let out = ws.output_dir();

    let report = Dispatcher::new(RunConfig::new(&input, &out).with_workers(2), CopyTool).run()?;
    let path = ws.path().join("report.json");
    report.save_to_file(&path)?;

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(value["run_name"], "reads");
    assert_eq!(value["batches"].as_array().map(Vec::len), Some(report.batch_count()));
    Ok(())
}

#[cfg(unix)]
#[test]
fn external_tool_with_relative_output_dir() -> Result<()> {
    init_logging();
    // A directory under the process working directory, addressed relatively.
    let root = tempfile::Builder::new().prefix("seqpack-rel").tempdir_in(".")?;
    let rel = std::path::Path::new(".").join(root.path().file_name().expect("temp dir name"));
    assert!(rel.is_relative());

    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(10, 100))?;
    let out = rel.join("out");

    let tool = ExternalTool::new("sh").with_leading_args([
        "-c",
        r#"test -f "$2" || { echo "no such input $2" >&2; exit 1; }
cp "$2" "$4.fasta"
echo "batches: 1" > "$4.summary.txt""#,
        "sh",
    ]);
    Dispatcher::new(RunConfig::new(&input, &out).with_workers(2), tool).run()?;

    assert_eq!(fs::read(out.join("reads.fasta"))?, fs::read(&input)?);
    assert_eq!(fs::read_to_string(out.join("reads.summary.txt"))?, "batches: 2\n");
    assert!(!out.join("1").exists());
    Ok(())
}

#[test]
fn unwritable_batch_dir_stops_queueing() -> Result<()> {
    init_logging();
    let ws = TestWorkspace::new()?;
    let input = ws.write_input("reads.fasta", &synthetic_records(10, 100))?;
    let out = ws.output_dir();
    fs::create_dir_all(&out)?;
    // A plain file where batch 2's directory has to go.
    fs::write(out.join("2"), "not a directory")?;

    let err = Dispatcher::new(
        RunConfig::new(&input, &out).with_workers(2),
        FailingTool::on([1]),
    )
    .run()
    .unwrap_err();

    let msg = format!("{err:#}");
    assert!(msg.contains("rm -r"), "{msg}");
    // Batch 1 either ran and failed, or was skipped after cancellation.
    if msg.contains("simulated failure") {
        assert!(msg.contains("batches already running also failed"), "{msg}");
    }
    assert!(out.join("1").is_dir());
    assert!(!out.join("reads.fasta").exists());
    Ok(())
}
