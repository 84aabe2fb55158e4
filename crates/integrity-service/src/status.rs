use crate::reporter::ProcessIdentity;
use anyhow::{Context, Result};
use integrity_core::{CheckCycleReport, CheckStatus};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Latest cycle report, replaced atomically after every cycle so readers
/// never see a half-written document.
pub struct StatusFile {
    path: PathBuf,
}

#[derive(Serialize)]
struct StatusDocument<'a> {
    program: &'a str,
    pid: u32,
    status: CheckStatus,
    #[serde(flatten)]
    report: &'a CheckCycleReport,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, identity: &ProcessIdentity, report: &CheckCycleReport) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let doc = StatusDocument {
            program: identity.program(),
            pid: identity.pid(),
            status: report.status(),
            report,
        };
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("cannot create temp file in {}", dir.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &doc)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        Ok(())
    }
}
