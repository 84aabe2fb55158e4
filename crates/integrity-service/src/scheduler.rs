//! Trigger scheduling for check cycles.
//!
//! A periodic timer and `SIGUSR1` both feed a single pending-work slot
//! (an `mpsc` channel of capacity one), consumed by the daemon's only worker.
//! Producers never block and never do work themselves: if the slot is
//! already full the trigger is coalesced into the pending one, so any burst
//! that lands while a cycle is running produces exactly one follow-up.
//!
//! Shutdown travels on a separate `watch` channel and is always checked
//! first, so it preempts whatever is pending.
//!
//! Signals are received through tokio's `signal::unix` streams. The handler
//! tokio installs does nothing but write to a self-pipe; the listener task
//! below turns that into a trigger outside signal context.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// Longest timer period accepted; larger values would overflow the clock.
pub const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic timer fired.
    Tick,
    /// Out-of-band request (`SIGUSR1`).
    ManualTick,
    /// Stop after the cycle in flight, if any.
    Shutdown,
}

/// Cloneable producer side of the scheduler.
#[derive(Clone)]
pub struct TriggerHandle {
    pending_tx: mpsc::Sender<Trigger>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl TriggerHandle {
    /// Post a trigger without blocking. Returns `false` when it was
    /// coalesced into an already pending one or arrived after shutdown.
    pub fn request(&self, trigger: Trigger) -> bool {
        if trigger == Trigger::Shutdown {
            self.shutdown();
            return true;
        }
        if self.is_shutting_down() {
            return false;
        }
        match self.pending_tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(?trigger, "check already pending, trigger coalesced");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

pub struct TriggerScheduler {
    handle: TriggerHandle,
    pending_rx: mpsc::Receiver<Trigger>,
    shutdown_rx: watch::Receiver<bool>,
    sources: Vec<JoinHandle<()>>,
}

impl Default for TriggerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerScheduler {
    pub fn new() -> Self {
        let (pending_tx, pending_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            handle: TriggerHandle {
                pending_tx,
                shutdown_tx: Arc::new(shutdown_tx),
            },
            pending_rx,
            shutdown_rx,
            sources: Vec::new(),
        }
    }

    pub fn handle(&self) -> TriggerHandle {
        self.handle.clone()
    }

    /// Start the periodic timer. The first tick fires one full `period`
    /// after this call; ticks missed while the worker is busy are skipped.
    /// Periods above [`MAX_PERIOD`] are clamped to it.
    pub fn spawn_interval(&mut self, period: Duration) {
        let period = if period > MAX_PERIOD {
            warn!(requested_secs = period.as_secs(), "timer period clamped");
            MAX_PERIOD
        } else {
            period
        };
        let handle = self.handle.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        handle.request(Trigger::Tick);
                    }
                    _ = shutdown.changed() => {
                        debug!("interval source stopping");
                        return;
                    }
                }
            }
        });
        self.sources.push(task);
    }

    /// Route `SIGUSR1` to [`Trigger::ManualTick`] and `SIGTERM`/`SIGINT` to
    /// shutdown. `SIGHUP` and `SIGQUIT` are caught and ignored so the daemon
    /// outlives its controlling terminal. The handlers are registered before
    /// this returns, so a signal arriving afterwards can no longer kill the
    /// process with its default disposition.
    #[cfg(unix)]
    pub fn spawn_signal_listener(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = signal(SignalKind::user_defined1())?;
        let mut term = signal(SignalKind::terminate())?;
        let mut int = signal(SignalKind::interrupt())?;
        let mut hup = signal(SignalKind::hangup())?;
        let mut quit = signal(SignalKind::quit())?;
        let handle = self.handle.clone();
        let mut shutdown = self.shutdown_rx.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = usr1.recv() => {
                        debug!("SIGUSR1 received");
                        handle.request(Trigger::ManualTick);
                    }
                    _ = term.recv() => {
                        info!("SIGTERM received");
                        handle.shutdown();
                    }
                    _ = int.recv() => {
                        info!("SIGINT received");
                        handle.shutdown();
                    }
                    _ = hup.recv() => info!("SIGHUP received, ignoring"),
                    _ = quit.recv() => info!("SIGQUIT received, ignoring"),
                    _ = shutdown.changed() => return,
                }
            }
        });
        self.sources.push(task);
        Ok(())
    }

    /// Next event for the worker. After the first `Shutdown` every call
    /// returns `Shutdown` again.
    pub async fn next(&mut self) -> Trigger {
        loop {
            if *self.shutdown_rx.borrow_and_update() {
                return Trigger::Shutdown;
            }
            tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() {
                        return Trigger::Shutdown;
                    }
                }
                trigger = self.pending_rx.recv() => {
                    return trigger.unwrap_or(Trigger::Shutdown);
                }
            }
        }
    }

    /// Signal shutdown to every source and wait for them to finish.
    pub async fn stop(mut self) {
        self.handle.shutdown();
        for task in self.sources.drain(..) {
            if let Err(e) = task.await {
                debug!(error = %e, "trigger source ended abnormally");
            }
        }
    }
}
