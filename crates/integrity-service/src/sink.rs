//! Destinations for integrity records.
//!
//! The daemon only needs "emit this line": syslog in production, a line
//! writer for stderr or a plain file when syslog is not wanted, and an
//! in-memory sink for tests. Every write is flushed before returning so a
//! line-based scraper never sees a partial record.

use crate::reporter::ProcessIdentity;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

pub trait LogSink: Send + Sync {
    /// Write one complete record. Sinks that do not stamp the process
    /// identity themselves must prefix the line with `identity`.
    fn write_record(
        &self,
        identity: &ProcessIdentity,
        severity: Severity,
        message: &str,
    ) -> io::Result<()>;
}

/// System log via `openlog(3)`/`syslog(3)` with `LOG_PID`, which yields the
/// `<program>[<pid>]:` tag on every line.
#[cfg(unix)]
pub struct SyslogSink {
    // openlog keeps this pointer; it must outlive every syslog call.
    _ident: std::ffi::CString,
}

#[cfg(unix)]
impl SyslogSink {
    pub fn open(identity: &ProcessIdentity) -> io::Result<Self> {
        let ident = std::ffi::CString::new(identity.program())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        unsafe {
            libc::openlog(ident.as_ptr(), libc::LOG_PID | libc::LOG_NDELAY, libc::LOG_USER);
        }
        Ok(Self { _ident: ident })
    }
}

#[cfg(unix)]
impl LogSink for SyslogSink {
    fn write_record(
        &self,
        _identity: &ProcessIdentity,
        severity: Severity,
        message: &str,
    ) -> io::Result<()> {
        let line = std::ffi::CString::new(message.replace('\0', "\\0"))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let priority = match severity {
            Severity::Info => libc::LOG_INFO,
            Severity::Error => libc::LOG_ERR,
        };
        unsafe {
            libc::syslog(priority, b"%s\0".as_ptr().cast(), line.as_ptr());
        }
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for SyslogSink {
    fn drop(&mut self) {
        unsafe { libc::closelog() };
    }
}

/// Timestamped lines on any writer (stderr, an append-only file).
pub struct WriterSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl WriterSink<std::fs::File> {
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn write_record(
        &self,
        identity: &ProcessIdentity,
        _severity: Severity,
        message: &str,
    ) -> io::Result<()> {
        let line = format!(
            "{} {} {}\n",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            identity,
            message
        );
        let mut out = self.out.lock();
        out.write_all(line.as_bytes())?;
        out.flush()
    }
}

/// Keeps records in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<(Severity, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Severity, String)> {
        self.records.lock().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.records.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn last(&self) -> Option<String> {
        self.records.lock().last().map(|(_, l)| l.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn write_record(
        &self,
        identity: &ProcessIdentity,
        severity: Severity,
        message: &str,
    ) -> io::Result<()> {
        self.records
            .lock()
            .push((severity, format!("{identity} {message}")));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writer_sink_prefixes_identity_and_ends_line() {
        let identity = ProcessIdentity::new("/usr/bin/integrity_checker", 42);
        let sink = WriterSink::new(Vec::new());
        sink.write_record(&identity, Severity::Info, "Integrity check: OK")
            .unwrap();

        let out = String::from_utf8(sink.out.into_inner()).unwrap();
        assert!(out.ends_with("/usr/bin/integrity_checker[42]: Integrity check: OK\n"));
        assert_eq!(out.lines().count(), 1);
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.log");
        let identity = ProcessIdentity::new("prog", 1);
        {
            let sink = WriterSink::append_to(&path).unwrap();
            sink.write_record(&identity, Severity::Info, "one").unwrap();
        }
        let sink = WriterSink::append_to(&path).unwrap();
        sink.write_record(&identity, Severity::Error, "two").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("prog[1]: two"));
    }

    #[test]
    fn memory_sink_clones_share_records() {
        let sink = MemorySink::new();
        let other = sink.clone();
        other
            .write_record(&ProcessIdentity::new("p", 7), Severity::Error, "x")
            .unwrap();
        assert_eq!(sink.records(), vec![(Severity::Error, "p[7]: x".to_string())]);
    }
}
