//! # Autosave Scheduler
//!
//! A timer task that offers ticks to the session worker and nothing more. It
//! holds no document state: whether a tick turns into a save is decided by the
//! worker, which knows if the document is dirty and when it was last saved.
//!
//! Ticks go through a channel of capacity one. If the worker has not picked up
//! the previous tick yet, the new one is dropped instead of piling up behind a
//! slow save.
//!
//! The task stops when the handle is cancelled or dropped, or when the worker
//! goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to a running tick loop. Dropping it stops the loop.
#[derive(Debug)]
pub struct AutosaveScheduler {
    handle: JoinHandle<()>,
}

impl AutosaveScheduler {
    pub fn spawn(period: Duration, ticks: mpsc::Sender<Instant>) -> Self {
        let handle = tokio::spawn(run(period, ticks));
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the tick loop now. Dropping the handle has the same effect.
    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(period: Duration, ticks: mpsc::Sender<Instant>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ticker.tick().await; // consume immediate first tick

    loop {
        let at = ticker.tick().await;
        match ticks.try_send(at) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("autosave tick skipped; previous tick still pending");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("autosave receiver gone; scheduler stopping");
                break;
            }
        }
    }
}

/// True when at least one full interval has passed since the last successful
/// save. A document that was never saved is always due.
pub fn is_due(last_saved: Option<Instant>, period: Duration, now: Instant) -> bool {
    match last_saved {
        Some(at) => now.saturating_duration_since(at) >= period,
        None => true,
    }
}

/// Keeps autosave cycles from overlapping.
#[derive(Debug, Default)]
pub struct InFlight {
    busy: AtomicBool,
}

impl InFlight {
    /// Claim the slot, or `None` if a cycle is already running. The slot is
    /// released when the guard drops, whatever path the cycle exits by.
    pub fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard { flag: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
