//! In-process lifecycle tests: a real daemon over a temp directory, driven
//! through the scheduler handle instead of process signals.

use integrity_service::sink::{LogSink, MemorySink, Severity};
use integrity_service::{
    Daemon, DaemonConfig, DaemonSummary, ProcessIdentity, Reporter, Trigger, TriggerHandle,
    TriggerScheduler,
};
use parking_lot::{Condvar, Mutex};
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::task::JoinHandle;

/// Holds every record write while closed, so a cycle can be kept in flight.
#[derive(Clone, Default)]
struct GatedSink {
    records: MemorySink,
    closed: Arc<(Mutex<bool>, Condvar)>,
    entered: Arc<AtomicUsize>,
}

impl GatedSink {
    fn close(&self) {
        *self.closed.0.lock() = true;
    }

    fn open(&self) {
        *self.closed.0.lock() = false;
        self.closed.1.notify_all();
    }

    async fn wait_entered(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while self.entered.load(Ordering::SeqCst) < count {
            assert!(tokio::time::Instant::now() < deadline, "cycle never reached the sink");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl LogSink for GatedSink {
    fn write_record(
        &self,
        identity: &ProcessIdentity,
        severity: Severity,
        message: &str,
    ) -> io::Result<()> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let (lock, cvar) = &*self.closed;
        let mut closed = lock.lock();
        while *closed {
            cvar.wait(&mut closed);
        }
        drop(closed);
        self.records.write_record(identity, severity, message)
    }
}

async fn wait_for_records(sink: &MemorySink, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while sink.len() < count {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {count} records, have {:?}",
            sink.lines()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn spawn_daemon(
    dir: &std::path::Path,
    sink: &(impl LogSink + Clone + 'static),
) -> (TriggerHandle, JoinHandle<anyhow::Result<DaemonSummary>>) {
    let identity = ProcessIdentity::new("/usr/sbin/integrity_checker", 4242);
    let reporter = Reporter::new(identity, Box::new(sink.clone()));
    // long interval: every cycle in these tests is requested explicitly
    let config = DaemonConfig::new(dir, Duration::from_secs(3600));
    let daemon = Daemon::start(config, reporter).await.unwrap();
    let scheduler = TriggerScheduler::new();
    let handle = scheduler.handle();
    let task = tokio::spawn(daemon.run(scheduler));
    (handle, task)
}

#[tokio::test]
async fn reference_scenario_reports_each_failure_kind() {
    let dir = tempdir().unwrap();
    let text = dir.path().join("text.txt");
    fs::write(&text, "Test text.").unwrap();
    let sink = MemorySink::new();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    let last = sink.last().unwrap();
    assert!(last.starts_with("/usr/sbin/integrity_checker[4242]:"));
    assert_eq!(last.split_whitespace().last(), Some("OK"));

    fs::write(&text, "Another test text.").unwrap();
    handle.request(Trigger::ManualTick);
    wait_for_records(&sink, 2).await;
    assert!(sink.last().unwrap().contains("FAIL"));
    assert!(sink.last().unwrap().contains("check sums differ:"));

    fs::remove_file(&text).unwrap();
    handle.request(Trigger::ManualTick);
    wait_for_records(&sink, 3).await;
    assert!(sink.last().unwrap().contains("file is NOT_FOUND)"));

    handle.request(Trigger::Shutdown);
    let summary = task.await.unwrap().unwrap();
    assert_eq!(
        summary,
        DaemonSummary {
            cycles: 3,
            failed_cycles: 2,
            unwritten_records: 0,
        }
    );
}

#[cfg(unix)]
#[tokio::test]
async fn revoked_permission_reports_not_accessible() {
    use std::os::unix::fs::PermissionsExt;

    if unsafe { libc::geteuid() } == 0 {
        return;
    }
    let dir = tempdir().unwrap();
    let text = dir.path().join("text.txt");
    fs::write(&text, "Test text.").unwrap();
    let sink = MemorySink::new();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    fs::set_permissions(&text, fs::Permissions::from_mode(0o000)).unwrap();
    handle.request(Trigger::ManualTick);
    wait_for_records(&sink, 2).await;
    fs::set_permissions(&text, fs::Permissions::from_mode(0o644)).unwrap();

    let line = sink.last().unwrap();
    let tokens: Vec<_> = line.split_whitespace().collect();
    assert!(tokens.contains(&"FAIL"));
    assert!(tokens.contains(&"NOT_ACCESSIBLE)"));

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn no_change_check_is_idempotent() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("a"), b"a").unwrap();
    fs::write(dir.path().join("nested/b"), b"b").unwrap();
    let sink = MemorySink::new();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    for n in 2..=4 {
        handle.request(Trigger::Tick);
        wait_for_records(&sink, n).await;
    }
    assert!(sink.lines().iter().all(|l| l.ends_with("Integrity check: OK")));

    handle.shutdown();
    assert_eq!(task.await.unwrap().unwrap().failed_cycles, 0);
}

#[tokio::test]
async fn new_files_do_not_change_the_tracked_set() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("tracked"), b"t").unwrap();
    let sink = MemorySink::new();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    fs::write(dir.path().join("newcomer"), b"n").unwrap();
    handle.request(Trigger::ManualTick);
    wait_for_records(&sink, 2).await;
    assert!(sink.last().unwrap().ends_with("OK"));

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn empty_directory_reports_ok() {
    let dir = tempdir().unwrap();
    let sink = MemorySink::new();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    handle.request(Trigger::Tick);
    wait_for_records(&sink, 2).await;
    assert!(sink.lines().iter().all(|l| l.ends_with("OK")));

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn triggers_after_shutdown_are_ignored() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"a").unwrap();
    let sink = MemorySink::new();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    handle.shutdown();
    assert!(!handle.request(Trigger::ManualTick));
    task.await.unwrap().unwrap();
    assert_eq!(sink.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_during_a_cycle_lets_it_report_first() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"a").unwrap();
    let sink = GatedSink::default();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    sink.close();
    assert!(handle.request(Trigger::ManualTick));
    sink.wait_entered(2).await;
    handle.request(Trigger::Shutdown);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!task.is_finished());

    sink.open();
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.cycles, 2);
    assert_eq!(sink.records.len(), 2);
    assert!(sink.records.last().unwrap().ends_with("Integrity check: OK"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_during_a_cycle_runs_exactly_one_follow_up() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a"), b"a").unwrap();
    let sink = GatedSink::default();
    let (handle, task) = spawn_daemon(dir.path(), &sink).await;

    sink.close();
    assert!(handle.request(Trigger::ManualTick));
    sink.wait_entered(2).await;
    assert!(handle.request(Trigger::ManualTick));
    assert!(!handle.request(Trigger::ManualTick));
    assert!(!handle.request(Trigger::Tick));
    assert!(!handle.request(Trigger::ManualTick));

    sink.open();
    wait_for_records(&sink.records, 3).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.records.len(), 3);

    handle.shutdown();
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.failed_cycles, 0);
}
