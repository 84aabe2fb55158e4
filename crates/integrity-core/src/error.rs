use std::path::PathBuf;
use thiserror::Error;

/// Directory-level failure that aborts a whole scan.
///
/// Per-file problems never surface here; they are recorded in the snapshot
/// as a [`FileAccessOutcome`](crate::digest::FileAccessOutcome).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("watched directory {0} does not exist")]
    RootMissing(PathBuf),
    #[error("watched directory {0} is not readable")]
    RootUnreadable(PathBuf),
    #[error("watched path {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("scan of {root} exceeded its deadline after {entries} entries")]
    DeadlineExceeded { root: PathBuf, entries: usize },
    #[error("cannot read watched directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    pub fn root(&self) -> &PathBuf {
        match self {
            ScanError::RootMissing(p)
            | ScanError::RootUnreadable(p)
            | ScanError::NotADirectory(p) => p,
            ScanError::DeadlineExceeded { root, .. } => root,
            ScanError::Io { path, .. } => path,
        }
    }
}
