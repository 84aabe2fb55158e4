//! Baseline comparison.
//!
//! The baseline defines the tracked set: every baseline path yields exactly
//! one [`CheckResult`] per cycle, in baseline order, and paths that appeared
//! after the baseline was captured are not reported.

use crate::digest::{Digest, FileAccessOutcome};
use crate::error::ScanError;
use crate::snapshot::{Baseline, Snapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Ok,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    Unchanged,
    /// `expected` is `None` when the baseline held no digest for the path.
    ChecksumMismatch {
        expected: Option<Digest>,
        actual: Digest,
    },
    NotAccessible,
    NotFound,
    OtherError {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub path: PathBuf,
    pub status: CheckStatus,
    pub reason: FailureReason,
}

impl CheckResult {
    fn ok(path: PathBuf) -> Self {
        Self {
            path,
            status: CheckStatus::Ok,
            reason: FailureReason::Unchanged,
        }
    }

    fn fail(path: PathBuf, reason: FailureReason) -> Self {
        Self {
            path,
            status: CheckStatus::Fail,
            reason,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

/// What caused a check cycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleTrigger {
    Startup,
    Timer,
    Manual,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Checked { results: Vec<CheckResult> },
    /// The scan failed before any file could be compared.
    Aborted { root: PathBuf, error: AbortReason },
}

/// Serializable summary of the [`ScanError`] that aborted a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    RootMissing,
    RootUnreadable,
    NotADirectory,
    DeadlineExceeded,
    Io(String),
}

impl From<&ScanError> for AbortReason {
    fn from(err: &ScanError) -> Self {
        match err {
            ScanError::RootMissing(_) => AbortReason::RootMissing,
            ScanError::RootUnreadable(_) => AbortReason::RootUnreadable,
            ScanError::NotADirectory(_) => AbortReason::NotADirectory,
            ScanError::DeadlineExceeded { .. } => AbortReason::DeadlineExceeded,
            ScanError::Io { source, .. } => AbortReason::Io(source.to_string()),
        }
    }
}

/// Everything one check cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct CheckCycleReport {
    pub trigger: CycleTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
}

impl CheckCycleReport {
    pub fn checked(
        trigger: CycleTrigger,
        started_at: DateTime<Utc>,
        results: Vec<CheckResult>,
    ) -> Self {
        Self {
            trigger,
            started_at,
            finished_at: Utc::now(),
            outcome: CycleOutcome::Checked { results },
        }
    }

    pub fn aborted(trigger: CycleTrigger, started_at: DateTime<Utc>, err: &ScanError) -> Self {
        Self {
            trigger,
            started_at,
            finished_at: Utc::now(),
            outcome: CycleOutcome::Aborted {
                root: err.root().clone(),
                error: AbortReason::from(err),
            },
        }
    }

    pub fn status(&self) -> CheckStatus {
        match &self.outcome {
            CycleOutcome::Checked { results } if results.iter().all(CheckResult::is_ok) => {
                CheckStatus::Ok
            }
            _ => CheckStatus::Fail,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == CheckStatus::Ok
    }

    pub fn results(&self) -> &[CheckResult] {
        match &self.outcome {
            CycleOutcome::Checked { results } => results,
            CycleOutcome::Aborted { .. } => &[],
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results().iter().filter(|r| !r.is_ok())
    }
}

/// Compare a fresh snapshot against the baseline.
pub fn check(baseline: &Baseline, current: &Snapshot) -> Vec<CheckResult> {
    baseline
        .snapshot()
        .iter()
        .map(|(path, expected)| classify(path, expected, current))
        .collect()
}

fn classify(path: &Path, expected: &FileAccessOutcome, current: &Snapshot) -> CheckResult {
    let Some(actual) = current.get(path) else {
        let reason = if current.is_under_unreadable_dir(path) {
            FailureReason::NotAccessible
        } else {
            FailureReason::NotFound
        };
        return CheckResult::fail(path.to_path_buf(), reason);
    };

    match actual {
        FileAccessOutcome::Digest(now) => match expected.digest() {
            Some(then) if *then == now.digest => CheckResult::ok(path.to_path_buf()),
            then => CheckResult::fail(
                path.to_path_buf(),
                FailureReason::ChecksumMismatch {
                    expected: then.copied(),
                    actual: now.digest,
                },
            ),
        },
        FileAccessOutcome::NotAccessible => {
            CheckResult::fail(path.to_path_buf(), FailureReason::NotAccessible)
        }
        FileAccessOutcome::NotFound => {
            CheckResult::fail(path.to_path_buf(), FailureReason::NotFound)
        }
        FileAccessOutcome::OtherError { message } => CheckResult::fail(
            path.to_path_buf(),
            FailureReason::OtherError {
                message: message.clone(),
            },
        ),
    }
}
