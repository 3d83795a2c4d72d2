//! Offline loss reconstruction.
//!
//! Re-derives loss runs from a saved session transcript. Each line carrying
//! the field delimiter starts with a timestamp; lines containing the loss
//! marker are losses, every other such line is a good probe. Runs are printed
//! as soon as they close. Each file gets fresh state.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::state::LossTracker;
use crate::transcript::ansi::{lossy_lines, strip};
use crate::transcript::timestamp::{Timestamp, TimestampError};

/// Substring identifying a loss line
pub const LOSS_MARKER: &str = "lost or arrived out of order";

/// Separates the timestamp from the rest of a timestamped line
pub const FIELD_DELIMITER: char = '|';

/// Errors raised while reconstructing loss from transcripts
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("failed to open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {} at line {line}", path.display())]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: io::Error,
    },
    #[error("{}:{line}: failed to parse timestamp", path.display())]
    Timestamp {
        path: PathBuf,
        line: usize,
        #[source]
        source: TimestampError,
    },
    #[error("failed to write report")]
    Write(#[from] io::Error),
}

/// One classified transcript line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: Timestamp,
    pub is_loss: bool,
}

/// Outcome of scanning one transcript
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Closed runs printed
    pub runs: usize,
    /// Loss count of a run still open at end of file (never printed)
    pub unclosed: Option<u64>,
}

/// Classify a single transcript line
///
/// Lines without the field delimiter carry no timestamp and yield `None`.
pub fn parse_record(line: &str) -> Result<Option<Record>, TimestampError> {
    let line = strip(line);
    if !line.contains(FIELD_DELIMITER) {
        return Ok(None);
    }

    let timestamp = Timestamp::parse_line(&line)?;
    Ok(Some(Record {
        timestamp,
        is_loss: line.contains(LOSS_MARKER),
    }))
}

/// Scan one transcript, printing a header, each closed run, and a footer
pub fn scan<R: BufRead, W: Write>(
    path: &Path,
    reader: R,
    out: &mut W,
) -> Result<ScanSummary, TranscriptError> {
    writeln!(out, "{}:", path.display())?;

    let mut tracker = LossTracker::new();
    let mut summary = ScanSummary::default();

    for (index, line) in lossy_lines(reader).enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|source| TranscriptError::Read {
            path: path.to_path_buf(),
            line: line_no,
            source,
        })?;

        let record = parse_record(&line).map_err(|source| TranscriptError::Timestamp {
            path: path.to_path_buf(),
            line: line_no,
            source,
        })?;

        if let Some(record) = record
            && let Some(run) = tracker.observe(record.timestamp, record.is_loss)
        {
            writeln!(out, "{run}")?;
            summary.runs += 1;
        }
    }

    summary.unclosed = tracker.open_run().map(|run| run.count);
    if let Some(count) = summary.unclosed {
        log::debug!(
            "{}: trailing run of {} loss(es) left open",
            path.display(),
            count
        );
    }

    if summary.runs == 0 {
        writeln!(out, "No dropped packets found")?;
    } else {
        writeln!(out)?;
    }
    out.flush()?;

    Ok(summary)
}

/// Open and scan a single transcript file
pub fn reconstruct_file<W: Write>(path: &Path, out: &mut W) -> Result<ScanSummary, TranscriptError> {
    let file = File::open(path).map_err(|source| TranscriptError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    scan(path, BufReader::new(file), out)
}

/// Scan each file in order, stopping at the first error
pub fn reconstruct_files<P: AsRef<Path>, W: Write>(
    paths: &[P],
    out: &mut W,
) -> Result<(), TranscriptError> {
    for path in paths {
        reconstruct_file(path.as_ref(), out)?;
    }
    Ok(())
}
