//! Checksum baseline, directory scanning and baseline comparison for the
//! integrity checker daemon. Everything here is synchronous and free of
//! process-level state so it can be driven from tests with synthetic
//! snapshots.

pub mod checker;
pub mod digest;
pub mod error;
pub mod snapshot;

pub use checker::{
    check, AbortReason, CheckCycleReport, CheckResult, CheckStatus, CycleOutcome, CycleTrigger,
    FailureReason,
};
pub use digest::{digest_file, digest_symlink, Digest, FileAccessOutcome, FileDigest};
pub use error::ScanError;
pub use snapshot::{scan, Baseline, ScanLimits, Snapshot};
