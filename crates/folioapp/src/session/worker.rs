//! The session's background worker.
//!
//! One task per session handles, strictly one at a time:
//!
//! - recovery checkpoint requests sent by `mutate`,
//! - autosave ticks from the [`crate::autosave::AutosaveScheduler`],
//! - change notifications from the [`crate::watcher::ChangeWatcher`],
//! - flush requests, answered once everything queued before them is done.
//!
//! Direct session messages are polled first so a flush never overtakes the
//! checkpoints requested before it.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::debug;

use super::{AutosaveOutcome, Shared};

#[derive(Debug)]
pub(crate) enum WorkerMsg {
    Checkpoint,
    Flush(oneshot::Sender<()>),
}

pub(crate) async fn run(
    shared: Arc<Shared>,
    mut messages: mpsc::UnboundedReceiver<WorkerMsg>,
    mut ticks: mpsc::Receiver<Instant>,
    mut changes: mpsc::UnboundedReceiver<PathBuf>,
) {
    loop {
        tokio::select! {
            biased;
            Some(msg) = messages.recv() => match msg {
                WorkerMsg::Checkpoint => shared.checkpoint_if_behind().await,
                WorkerMsg::Flush(done) => {
                    while let Ok(path) = changes.try_recv() {
                        shared.check_external_change(path).await;
                    }
                    while ticks.try_recv().is_ok() {
                        tick(&shared).await;
                    }
                    let _ = done.send(());
                }
            },
            Some(_) = ticks.recv() => tick(&shared).await,
            Some(path) = changes.recv() => shared.check_external_change(path).await,
            else => break,
        }
    }
    debug!("session worker stopped");
}

async fn tick(shared: &Shared) {
    if let AutosaveOutcome::Skipped(reason) = shared.autosave_cycle().await {
        debug!(?reason, "autosave tick skipped");
    }
}
