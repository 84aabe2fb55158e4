//! Directory snapshots and the frozen startup baseline.
//!
//! A scan walks the watched root recursively (sorted by file name so two
//! scans of an unchanged tree enumerate paths in the same order) and records
//! one [`FileAccessOutcome`] per file. Only a failure of the root itself is
//! fatal; everything below it is recorded and the walk continues.

use crate::digest::{digest_file, digest_symlink, FileAccessOutcome};
use crate::error::ScanError;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Bounds applied to a single scan.
#[derive(Debug, Clone, Default)]
pub struct ScanLimits {
    /// Abort the walk once this instant has passed.
    pub deadline: Option<Instant>,
}

impl ScanLimits {
    pub fn unbounded() -> Self {
        Self::default()
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Ordered mapping from path to read outcome.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    root: PathBuf,
    entries: Vec<(PathBuf, FileAccessOutcome)>,
    index: HashMap<PathBuf, usize>,
    unreadable_dirs: Vec<PathBuf>,
}

impl Snapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Record an outcome. A repeated path replaces the earlier outcome but
    /// keeps its original position.
    pub fn insert(&mut self, path: PathBuf, outcome: FileAccessOutcome) {
        match self.index.get(&path) {
            Some(&i) => self.entries[i].1 = outcome,
            None => {
                self.index.insert(path.clone(), self.entries.len());
                self.entries.push((path, outcome));
            }
        }
    }

    pub fn mark_unreadable_dir(&mut self, path: PathBuf) {
        if !self.unreadable_dirs.contains(&path) {
            self.unreadable_dirs.push(path);
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, path: &Path) -> Option<&FileAccessOutcome> {
        self.index.get(path).map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileAccessOutcome)> {
        self.entries.iter().map(|(p, o)| (p, o))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` sits below a directory this scan could not list.
    pub fn is_under_unreadable_dir(&self, path: &Path) -> bool {
        self.unreadable_dirs.iter().any(|d| path.starts_with(d))
    }
}

/// The snapshot captured at startup. There is no way to change it once
/// built; a failed check never rebaselines.
#[derive(Debug, Clone)]
pub struct Baseline {
    snapshot: Snapshot,
}

impl Baseline {
    pub fn capture(root: &Path, limits: &ScanLimits) -> Result<Self, ScanError> {
        let snapshot = scan(root, limits)?;
        debug!(root = %root.display(), files = snapshot.len(), "baseline captured");
        Ok(Self { snapshot })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl From<Snapshot> for Baseline {
    fn from(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

/// Walk `root` and digest every regular file and symlink beneath it.
/// Linked directories are never descended into.
pub fn scan(root: &Path, limits: &ScanLimits) -> Result<Snapshot, ScanError> {
    check_root(root)?;

    let mut snapshot = Snapshot::new(root);
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1);

    for entry in walker {
        if limits.expired() {
            return Err(ScanError::DeadlineExceeded {
                root: root.to_path_buf(),
                entries: snapshot.len(),
            });
        }

        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                // The root was listable a moment ago, so this is a subtree
                // or an entry that changed under us.
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                if path == root {
                    return Err(classify_root_error(root, e.into()));
                }
                warn!(path = %path.display(), error = %e, "cannot list entry during scan");
                if e.io_error().map(io::Error::kind) == Some(io::ErrorKind::PermissionDenied) {
                    snapshot.mark_unreadable_dir(path);
                }
                continue;
            }
        };

        let file_type = entry.file_type();
        let outcome = if file_type.is_file() {
            digest_file(entry.path())
        } else if file_type.is_symlink() {
            digest_symlink(entry.path())
        } else {
            if !file_type.is_dir() {
                debug!(path = %entry.path().display(), "skipping special file");
            }
            continue;
        };
        snapshot.insert(entry.into_path(), outcome);
    }

    Ok(snapshot)
}

fn check_root(root: &Path) -> Result<(), ScanError> {
    let metadata = fs::metadata(root).map_err(|e| classify_root_error(root, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|e| classify_root_error(root, e))?;
    Ok(())
}

fn classify_root_error(root: &Path, err: io::Error) -> ScanError {
    match err.kind() {
        io::ErrorKind::NotFound => ScanError::RootMissing(root.to_path_buf()),
        io::ErrorKind::PermissionDenied => ScanError::RootUnreadable(root.to_path_buf()),
        _ => ScanError::Io {
            path: root.to_path_buf(),
            source: err,
        },
    }
}
