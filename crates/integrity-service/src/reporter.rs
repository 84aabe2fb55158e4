//! One log record per check cycle.
//!
//! The wording of a record is consumed by log scrapers, so the clause
//! tokens below (`check sums differ:`, `file is NOT_ACCESSIBLE)`,
//! `file is NOT_FOUND)`) must stay exactly as they are.

use crate::sink::{LogSink, Severity};
use integrity_core::{AbortReason, CheckCycleReport, CycleOutcome, FailureReason};
use std::fmt::{self, Write as _};
use std::io;
use std::path::Path;
use tracing::{debug, warn};

const RECORD_PREFIX: &str = "Integrity check:";

/// `<program>[<pid>]:`, the tag every record carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    program: String,
    pid: u32,
}

impl ProcessIdentity {
    pub fn new(program: impl Into<String>, pid: u32) -> Self {
        Self {
            program: program.into(),
            pid,
        }
    }

    /// The program as invoked (`argv[0]`), falling back to the executable
    /// path.
    pub fn current() -> Self {
        let program = std::env::args_os()
            .next()
            .map(|a| a.to_string_lossy().into_owned())
            .filter(|a| !a.is_empty())
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .map(|p| p.display().to_string())
            })
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        Self::new(program, std::process::id())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:", self.program, self.pid)
    }
}

pub struct Reporter {
    identity: ProcessIdentity,
    sink: Box<dyn LogSink>,
}

impl Reporter {
    pub fn new(identity: ProcessIdentity, sink: Box<dyn LogSink>) -> Self {
        Self { identity, sink }
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    /// Write the record for `report`. Returns once the sink has flushed it.
    pub fn report(&self, report: &CheckCycleReport) -> io::Result<()> {
        let message = format_record(report);
        let severity = if report.is_ok() {
            Severity::Info
        } else {
            Severity::Error
        };
        debug!(trigger = ?report.trigger, ok = report.is_ok(), "writing integrity record");
        self.sink
            .write_record(&self.identity, severity, &message)
            .map_err(|e| {
                warn!(error = %e, "failed to write integrity record");
                e
            })
    }
}

/// Render the record body; the sink adds the identity tag.
pub fn format_record(report: &CheckCycleReport) -> String {
    let mut line = String::from(RECORD_PREFIX);
    match &report.outcome {
        CycleOutcome::Aborted { root, error } => {
            let what = match error {
                AbortReason::RootMissing => "directory is NOT_FOUND".to_string(),
                AbortReason::RootUnreadable => "directory is NOT_ACCESSIBLE".to_string(),
                AbortReason::NotADirectory => "directory is NOT_A_DIRECTORY".to_string(),
                AbortReason::DeadlineExceeded => "scan timed out".to_string(),
                AbortReason::Io(msg) => format!("directory is UNDEFINED_ERROR: {msg}"),
            };
            let _ = write!(line, " FAIL ({} - {})", escape_path(root), escape_control(&what));
        }
        CycleOutcome::Checked { .. } if report.is_ok() => line.push_str(" OK"),
        CycleOutcome::Checked { .. } => {
            line.push_str(" FAIL");
            for failure in report.failures() {
                let path = escape_path(&failure.path);
                let _ = match &failure.reason {
                    FailureReason::ChecksumMismatch { expected, actual } => {
                        let expected = expected
                            .map(|d| d.to_hex())
                            .unwrap_or_else(|| "none".to_string());
                        write!(line, " ({path} - check sums differ: <{expected}, {actual}>)")
                    }
                    FailureReason::NotAccessible => {
                        write!(line, " ({path} - file is NOT_ACCESSIBLE)")
                    }
                    FailureReason::NotFound => write!(line, " ({path} - file is NOT_FOUND)"),
                    FailureReason::OtherError { .. } => {
                        write!(line, " ({path} - file is UNDEFINED_ERROR)")
                    }
                    FailureReason::Unchanged => Ok(()),
                };
            }
        }
    }
    line
}

/// A record is one line: control characters in a file name (a newline, a
/// carriage return) are rendered as escapes instead of breaking it.
fn escape_path(path: &Path) -> String {
    escape_control(&path.display().to_string())
}

fn escape_control(text: &str) -> String {
    if !text.chars().any(char::is_control) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}
