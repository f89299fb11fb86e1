//! Summation of line-aligned summary reports.
//!
//! Every batch leaves a small text report whose lines follow the grammar
//!
//! ```text
//! line      := label delimiter integer | text
//! delimiter := [ \t:=]*
//! integer   := [0-9]+            (the maximal trailing digit run)
//! ```
//!
//! Reports from different batches describe the same quantities, so they have
//! the same number of lines and the same label on each numeric line; only the
//! numbers, and the padding between label and number, differ. Aggregation
//! checks both before adding anything up.
//!
//! ```
//! use seqpack::summary::{SummaryReport, aggregate};
//!
//! let a = SummaryReport::parse("reads: 100\n");
//! let b = SummaryReport::parse("reads: 50\n");
//! let total = aggregate(&[a, b])?;
//! assert_eq!(total.to_string(), "reads: 150\n");
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Each output line keeps the first report's prefix, cut back to the shortest
//! label-plus-delimiter width seen for that line, so column padding that
//! shrinks in some batch (because its number is wider) shrinks in the
//! aggregate as well.

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::LazyLock;

static COUNT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<label>.*?)(?P<delim>[ \t:=]*)(?P<value>[0-9]+)$").expect("valid summary regex")
});

/// One line of a summary report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SummaryLine {
    /// A labelled count. `prefix` is everything before the digits.
    Count {
        label: String,
        prefix: String,
        value: u64,
    },
    /// A line without a trailing integer; carried through from the first report.
    Text(String),
}

impl SummaryLine {
    /// Parse a single line (without its terminator).
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let Some(caps) = COUNT_LINE.captures(line) else {
            return Self::Text(line.to_string());
        };
        let value_match = &caps["value"];
        // Digit runs too long for u64 are not counts we can add up.
        let Ok(value) = value_match.parse::<u64>() else {
            return Self::Text(line.to_string());
        };
        let start = line.len() - value_match.len();
        Self::Count {
            label: caps["label"].to_string(),
            prefix: line[..start].to_string(),
            value,
        }
    }

    /// Count value, if this is a numeric line.
    #[must_use]
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Count { value, .. } => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for SummaryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count { prefix, value, .. } => write!(f, "{prefix}{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// An ordered sequence of summary lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryReport {
    pub lines: Vec<SummaryLine>,
}

impl SummaryReport {
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(SummaryLine::parse).collect(),
        }
    }

    /// Read and parse a report file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// Write the report, one `\n`-terminated line each.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(f);
        write!(w, "{self}").with_context(|| format!("write {}", path.display()))?;
        w.flush().with_context(|| format!("flush {}", path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Value of the first numeric line whose label is `label`.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<u64> {
        self.lines.iter().find_map(|line| match line {
            SummaryLine::Count { label: l, value, .. } if l == label => Some(*value),
            _ => None,
        })
    }

    /// Add `other` into `self`, line by line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line counts differ, a label differs, a line is
    /// numeric in one report and text in the other, or a sum overflows.
    pub fn merge(&mut self, other: &SummaryReport) -> Result<()> {
        if self.lines.len() != other.lines.len() {
            bail!(
                "summary has {} lines, expected {}",
                other.lines.len(),
                self.lines.len()
            );
        }

        // Validate and sum every line before touching any value.
        let mut updates = Vec::with_capacity(self.lines.len());
        for (idx, (acc, new)) in self.lines.iter().zip(&other.lines).enumerate() {
            match (acc, new) {
                (
                    SummaryLine::Count {
                        label: a,
                        prefix,
                        value,
                    },
                    SummaryLine::Count {
                        label: b,
                        prefix: new_prefix,
                        value: new_value,
                    },
                ) => {
                    if a != b {
                        bail!("line {}: label {:?} does not match {:?}", idx + 1, b, a);
                    }
                    let sum = value
                        .checked_add(*new_value)
                        .ok_or_else(|| anyhow!("line {}: sum overflows", idx + 1))?;
                    updates.push(Some((sum, prefix.len().min(new_prefix.len()))));
                }
                (SummaryLine::Text(_), SummaryLine::Text(_)) => updates.push(None),
                _ => bail!(
                    "line {}: numeric in one summary but not the other",
                    idx + 1
                ),
            }
        }

        for (line, update) in self.lines.iter_mut().zip(updates) {
            if let (SummaryLine::Count { prefix, value, .. }, Some((sum, boundary))) = (line, update)
            {
                *value = sum;
                prefix.truncate(boundary);
            }
        }
        Ok(())
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Sum reports in order. A single report comes back unchanged.
///
/// # Errors
///
/// Returns an error if `reports` is empty or any pair fails to merge.
pub fn aggregate(reports: &[SummaryReport]) -> Result<SummaryReport> {
    let Some((first, rest)) = reports.split_first() else {
        bail!("no summary reports to aggregate");
    };
    let mut acc = first.clone();
    for (i, report) in rest.iter().enumerate() {
        acc.merge(report)
            .with_context(|| format!("merge summary #{}", i + 2))?;
    }
    Ok(acc)
}

/// Read every report in `paths`, sum them and write the result to `dest`.
///
/// # Errors
///
/// Returns an error if a report is missing or unreadable, the reports
/// disagree, or `dest` cannot be written.
pub fn aggregate_files<P: AsRef<Path>>(paths: &[P], dest: &Path) -> Result<SummaryReport> {
    let Some((first, rest)) = paths.split_first() else {
        bail!("no summary reports to aggregate");
    };
    let mut acc = SummaryReport::read(first)?;
    for path in rest {
        let path = path.as_ref();
        let report = SummaryReport::read(path)?;
        acc.merge(&report)
            .with_context(|| format!("merge {}", path.display()))?;
    }
    acc.write(dest)?;
    Ok(acc)
}
