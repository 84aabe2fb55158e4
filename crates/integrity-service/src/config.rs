use anyhow::{bail, Result};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::scheduler::MAX_PERIOD;
use integrity_core::ScanLimits;

/// Flags historically spelled with a single dash (`-time_interval 2`).
const LEGACY_FLAGS: &[&str] = &["time_interval", "directory"];

#[derive(Parser, Debug)]
#[command(author, version, about = "File integrity checker daemon", long_about = None)]
pub struct Cli {
    /// Seconds between scheduled checks
    #[arg(long = "time_interval", env = "time_interval")]
    pub time_interval: u64,
    /// Directory whose files are tracked
    #[arg(long, env = "directory")]
    pub directory: PathBuf,
    /// Where integrity records go: syslog, stderr or file:<path>
    #[arg(long, default_value = "syslog")]
    pub log_target: LogTarget,
    /// Abort a scan that runs longer than this many seconds
    #[arg(long)]
    pub scan_timeout: Option<u64>,
    /// Write the latest cycle report as JSON to this path
    #[arg(long)]
    pub status_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Syslog,
    Stderr,
    File(PathBuf),
}

impl FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syslog" => Ok(LogTarget::Syslog),
            "stderr" => Ok(LogTarget::Stderr),
            other => match other.strip_prefix("file:") {
                Some(path) if !path.is_empty() => Ok(LogTarget::File(PathBuf::from(path))),
                _ => Err(format!(
                    "unknown log target '{other}'; expected syslog, stderr or file:<path>"
                )),
            },
        }
    }
}

/// Validated daemon settings.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub directory: PathBuf,
    pub interval: Duration,
    pub log_target: LogTarget,
    pub scan_timeout: Option<Duration>,
    pub status_file: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn new(directory: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            directory: directory.into(),
            interval,
            log_target: LogTarget::Syslog,
            scan_timeout: None,
            status_file: None,
        }
    }

    /// Limits for a scan starting now.
    pub fn scan_limits(&self) -> ScanLimits {
        ScanLimits {
            deadline: self.scan_timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }
}

impl TryFrom<Cli> for DaemonConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self> {
        if cli.time_interval == 0 {
            bail!("invalid timer duration was provided");
        }
        if cli.time_interval > MAX_PERIOD.as_secs() {
            bail!(
                "invalid timer duration was provided: at most {} seconds",
                MAX_PERIOD.as_secs()
            );
        }
        match cli.scan_timeout {
            Some(0) => bail!("scan timeout must be at least one second"),
            Some(t) if t > MAX_PERIOD.as_secs() => {
                bail!("scan timeout must be at most {} seconds", MAX_PERIOD.as_secs())
            }
            _ => {}
        }
        if cli.directory.as_os_str().is_empty() {
            bail!("no target directory was found");
        }
        Ok(Self {
            directory: cli.directory,
            interval: Duration::from_secs(cli.time_interval),
            log_target: cli.log_target,
            scan_timeout: cli.scan_timeout.map(Duration::from_secs),
            status_file: cli.status_file,
        })
    }
}

/// Rewrite `-time_interval` / `-directory` (and their `=value` forms) to the
/// double-dash spelling clap understands. Everything else passes through.
pub fn normalize_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(s) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = s.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let name = rest.split('=').next().unwrap_or(rest);
            if LEGACY_FLAGS.contains(&name) {
                OsString::from(format!("--{rest}"))
            } else {
                arg
            }
        })
        .collect()
}
