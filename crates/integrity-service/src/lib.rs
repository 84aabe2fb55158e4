//! File integrity monitoring daemon: scheduling, reporting and lifecycle
//! around the scanning and comparison in `integrity-core`.

pub mod config;
pub mod daemon;
pub mod reporter;
pub mod scheduler;
pub mod sink;
pub mod status;

pub use config::{Cli, DaemonConfig, LogTarget};
pub use daemon::{Daemon, DaemonState, DaemonSummary, StartupError};
pub use reporter::{ProcessIdentity, Reporter};
pub use scheduler::{Trigger, TriggerHandle, TriggerScheduler};
