//! Daemon lifecycle: `Starting -> Running -> ShuttingDown -> Stopped`.
//!
//! The daemon owns the baseline and is the single worker that consumes the
//! scheduler. A cycle (scan, compare, report) runs to completion before the
//! next trigger is read, so cycles never overlap and a shutdown request
//! waits for the cycle in flight.

use crate::config::{DaemonConfig, LogTarget};
use crate::reporter::{ProcessIdentity, Reporter};
use crate::scheduler::{Trigger, TriggerScheduler};
use crate::sink::{LogSink, WriterSink};
use crate::status::StatusFile;
use anyhow::{Context, Result};
use chrono::Utc;
use integrity_core::{check, scan, Baseline, CheckCycleReport, CycleTrigger, ScanError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot establish baseline: {0}")]
    Baseline(#[from] ScanError),
    #[error("baseline worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Counters returned when the daemon stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    /// Records the sink could not write.
    pub unwritten_records: u64,
}

pub struct Daemon {
    config: DaemonConfig,
    baseline: Arc<Baseline>,
    reporter: Reporter,
    status_file: Option<StatusFile>,
    state: DaemonState,
    summary: DaemonSummary,
}

impl Daemon {
    /// Capture the baseline and emit the startup record. Fails without
    /// writing any record when the watched directory cannot be scanned.
    pub async fn start(config: DaemonConfig, reporter: Reporter) -> Result<Self, StartupError> {
        info!(
            directory = %config.directory.display(),
            interval_secs = config.interval.as_secs(),
            "daemon starting"
        );

        let root = config.directory.clone();
        let limits = config.scan_limits();
        let started_at = Utc::now();
        let baseline =
            tokio::task::spawn_blocking(move || Baseline::capture(&root, &limits)).await??;
        info!(files = baseline.snapshot().len(), "baseline captured");

        let status_file = config.status_file.clone().map(StatusFile::new);
        let mut daemon = Self {
            config,
            baseline: Arc::new(baseline),
            reporter,
            status_file,
            state: DaemonState::Starting,
            summary: DaemonSummary::default(),
        };

        let results = check(&daemon.baseline, daemon.baseline.snapshot());
        let report = CheckCycleReport::checked(CycleTrigger::Startup, started_at, results);
        daemon.publish(&report);
        daemon.transition(DaemonState::Running);
        Ok(daemon)
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// Consume triggers until shutdown, then stop the scheduler's sources.
    pub async fn run(mut self, mut scheduler: TriggerScheduler) -> Result<DaemonSummary> {
        loop {
            let trigger = match scheduler.next().await {
                Trigger::Tick => CycleTrigger::Timer,
                Trigger::ManualTick => CycleTrigger::Manual,
                Trigger::Shutdown => break,
            };
            self.run_cycle(trigger).await?;
        }

        self.transition(DaemonState::ShuttingDown);
        scheduler.stop().await;
        self.transition(DaemonState::Stopped);
        info!(
            cycles = self.summary.cycles,
            failed = self.summary.failed_cycles,
            unwritten = self.summary.unwritten_records,
            "daemon stopped"
        );
        Ok(self.summary)
    }

    /// One full scan-compare-report pass.
    pub async fn run_cycle(&mut self, trigger: CycleTrigger) -> Result<CheckCycleReport> {
        let baseline = Arc::clone(&self.baseline);
        let root = self.config.directory.clone();
        let limits = self.config.scan_limits();
        let started_at = Utc::now();

        let report = tokio::task::spawn_blocking(move || match scan(&root, &limits) {
            Ok(current) => {
                CheckCycleReport::checked(trigger, started_at, check(&baseline, &current))
            }
            Err(err) => {
                warn!(error = %err, "scan aborted");
                CheckCycleReport::aborted(trigger, started_at, &err)
            }
        })
        .await
        .context("check cycle worker panicked")?;

        self.publish(&report);
        Ok(report)
    }

    fn publish(&mut self, report: &CheckCycleReport) {
        self.summary.cycles += 1;
        if report.is_ok() {
            info!(
                trigger = ?report.trigger,
                files = report.results().len(),
                "integrity check passed"
            );
        } else {
            self.summary.failed_cycles += 1;
            error!(
                trigger = ?report.trigger,
                failures = report.failures().count(),
                "integrity check failed"
            );
        }

        // The reporter already logged the sink error; the daemon keeps going.
        if self.reporter.report(report).is_err() {
            self.summary.unwritten_records += 1;
        }

        if let Some(status) = &self.status_file {
            if let Err(e) = status.write(self.reporter.identity(), report) {
                warn!(path = %status.path().display(), error = %e, "failed to write status file");
            }
        }
    }

    fn transition(&mut self, next: DaemonState) {
        info!(from = ?self.state, to = ?next, "daemon state change");
        self.state = next;
    }
}

/// Build the configured record sink.
pub fn open_sink(target: &LogTarget, identity: &ProcessIdentity) -> Result<Box<dyn LogSink>> {
    let sink: Box<dyn LogSink> = match target {
        #[cfg(unix)]
        LogTarget::Syslog => Box::new(
            crate::sink::SyslogSink::open(identity).context("cannot open system log")?,
        ),
        #[cfg(not(unix))]
        LogTarget::Syslog => {
            let _ = identity;
            anyhow::bail!("syslog is only available on unix; use --log-target stderr")
        }
        LogTarget::Stderr => Box::new(WriterSink::new(std::io::stderr())),
        LogTarget::File(path) => Box::new(
            WriterSink::append_to(path)
                .with_context(|| format!("cannot open record file {}", path.display()))?,
        ),
    };
    Ok(sink)
}

/// Wire everything up for the process: sink, signal listener, baseline,
/// timer, then run until shutdown.
pub async fn run(config: DaemonConfig) -> Result<DaemonSummary> {
    let identity = ProcessIdentity::current();
    let sink = open_sink(&config.log_target, &identity)?;
    let reporter = Reporter::new(identity, sink);

    // Handlers go in before the baseline scan so an early SIGUSR1 cannot
    // terminate the process.
    let mut scheduler = TriggerScheduler::new();
    #[cfg(unix)]
    {
        scheduler
            .spawn_signal_listener()
            .context("cannot install signal handlers")?;
    }

    let interval = config.interval;
    let directory: PathBuf = config.directory.clone();
    let daemon = Daemon::start(config, reporter)
        .await
        .with_context(|| format!("refusing to start on {}", directory.display()))?;

    scheduler.spawn_interval(interval);
    daemon.run(scheduler).await
}
