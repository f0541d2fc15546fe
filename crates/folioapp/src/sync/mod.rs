//! # Offline Queue
//!
//! Network-dependent operations (pushing a document, deleting it remotely,
//! license validation) go through the [`SyncCoordinator`]. Local saves never
//! wait on it.
//!
//! ## Submission
//!
//! - **Online, empty backlog**: the operation runs immediately through the
//!   [`SyncTransport`]. If it fails it is queued with one attempt recorded,
//!   so nothing is lost.
//! - **Offline, or online behind a backlog**: the operation is appended to
//!   the queue. Jumping a backlog would break submission order.
//!
//! ## Replay
//!
//! Going online drains the queue strictly FIFO. A failing head entry stays at
//! the head and stops the drain until it has failed `max_attempts` times; then
//! it is parked in the failed list, where it stays visible until the user
//! retries or cancels it, and the drain continues. Each drain with failures
//! emits one aggregated [`SyncEvent::ReplayFailed`].
//!
//! ## Persistence
//!
//! The queue is written to `sync/queue.json` after every change and reloaded
//! by [`SyncCoordinator::open`]. Queue mutations are serialized by the drain
//! lock, so writes land in the order the changes happened.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{FolioConfig, QUEUE_PATH};
use crate::error::{FolioError, Result};
use crate::store::{io, SharedBackend};

pub mod queue;

pub use queue::{load_queue, SyncOp, SyncOpKind, SyncQueue, SyncQueueEntry};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("rejected by remote: {0}")]
    Rejected(String),
}

/// Executes one operation against the remote side.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn execute(&self, op: &SyncOp) -> std::result::Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StatusChanged { online: bool },
    Queued { id: Uuid, pending: usize },
    Executed { id: Uuid },
    Parked { id: Uuid, error: String },
    ReplayFailed {
        failed: usize,
        pending: usize,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Executed,
    Queued(Uuid),
}

/// What one drain did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub executed: Vec<Uuid>,
    /// Entries parked in the failed list during this drain.
    pub failed: Vec<Uuid>,
    /// The drain stopped on a head entry that still has attempts left.
    pub stalled: bool,
    pub pending: usize,
    pub last_error: Option<String>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.stalled
    }

    pub fn to_error(&self) -> Option<FolioError> {
        if self.is_clean() {
            return None;
        }
        Some(FolioError::QueueReplay {
            failed: self.failed.len(),
            pending: self.pending,
            message: self
                .last_error
                .clone()
                .unwrap_or_else(|| "replay interrupted".to_string()),
        })
    }
}

pub struct SyncCoordinator {
    backend: SharedBackend,
    transport: Arc<dyn SyncTransport>,
    queue_path: PathBuf,
    max_attempts: u32,
    online: AtomicBool,
    queue: Mutex<SyncQueue>,
    drain_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncCoordinator {
    /// Open the coordinator, reloading whatever was left queued last time.
    pub async fn open(
        backend: SharedBackend,
        transport: Arc<dyn SyncTransport>,
        max_attempts: u32,
        online: bool,
    ) -> Result<Arc<Self>> {
        let queue_path = PathBuf::from(QUEUE_PATH);
        let queue = match load_queue(&backend, &queue_path).await {
            Ok(queue) => queue,
            Err(FolioError::Serialization(e)) => {
                set_aside_corrupt_queue(&backend, &queue_path).await;
                warn!(error = %e, "sync queue unreadable; starting empty");
                SyncQueue::default()
            }
            Err(e) => return Err(e),
        };
        info!(
            pending = queue.pending_len(),
            failed = queue.failed().len(),
            online,
            "sync coordinator opened"
        );

        let (events, _) = broadcast::channel(64);
        Ok(Arc::new(Self {
            backend,
            transport,
            queue_path,
            max_attempts: max_attempts.max(1),
            online: AtomicBool::new(online),
            queue: Mutex::new(queue),
            drain_lock: tokio::sync::Mutex::new(()),
            events,
        }))
    }

    /// [`open`](Self::open) with the retry cap from `sync_max_attempts`.
    pub async fn from_config(
        backend: SharedBackend,
        transport: Arc<dyn SyncTransport>,
        config: &FolioConfig,
        online: bool,
    ) -> Result<Arc<Self>> {
        Self::open(backend, transport, config.sync_max_attempts, online).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    /// Execute now or defer, preserving submission order either way.
    pub async fn submit(&self, op: SyncOp) -> Result<SubmitOutcome> {
        let _serial = self.drain_lock.lock().await;

        let defer = !self.is_online() || self.queue.lock().has_backlog();
        if defer {
            let entry = self.queue.lock().enqueue(op, 0, None);
            debug!(id = %entry.id, op = %entry.op.label(), "sync op deferred");
            self.persist().await;
            self.emit(SyncEvent::Queued {
                id: entry.id,
                pending: self.pending_count(),
            });
            return Ok(SubmitOutcome::Queued(entry.id));
        }

        match self.transport.execute(&op).await {
            Ok(()) => Ok(SubmitOutcome::Executed),
            Err(e) => {
                warn!(op = %op.label(), error = %e, "sync op failed; queueing for replay");
                let entry = self.queue.lock().enqueue(op, 1, Some(e.to_string()));
                self.persist().await;
                self.emit(SyncEvent::Queued {
                    id: entry.id,
                    pending: self.pending_count(),
                });
                Ok(SubmitOutcome::Queued(entry.id))
            }
        }
    }

    /// Record a connectivity change. Going online replays the backlog.
    pub async fn set_online(&self, online: bool) -> Result<Option<ReplayReport>> {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was == online {
            return Ok(None);
        }
        info!(online, "connectivity changed");
        self.emit(SyncEvent::StatusChanged { online });
        if online {
            return self.drain().await.map(Some);
        }
        Ok(None)
    }

    /// Replay queued operations in order until the queue is empty, the head
    /// entry fails with attempts left, or connectivity drops.
    pub async fn drain(&self) -> Result<ReplayReport> {
        let _serial = self.drain_lock.lock().await;
        let mut report = ReplayReport::default();

        while self.is_online() {
            let Some(entry) = self.queue.lock().front().cloned() else {
                break;
            };

            match self.transport.execute(&entry.op).await {
                Ok(()) => {
                    self.queue.lock().pop_front();
                    report.executed.push(entry.id);
                    self.persist().await;
                    self.emit(SyncEvent::Executed { id: entry.id });
                }
                Err(e) => {
                    let message = e.to_string();
                    report.last_error = Some(message.clone());
                    let parked = {
                        let mut queue = self.queue.lock();
                        match queue.front_mut() {
                            Some(head) => {
                                head.attempts += 1;
                                head.last_error = Some(message.clone());
                                if head.attempts >= self.max_attempts {
                                    queue.park_front();
                                    true
                                } else {
                                    false
                                }
                            }
                            None => false,
                        }
                    };
                    self.persist().await;

                    if parked {
                        warn!(
                            id = %entry.id,
                            op = %entry.op.label(),
                            error = %message,
                            "sync op parked after repeated failures"
                        );
                        report.failed.push(entry.id);
                        self.emit(SyncEvent::Parked {
                            id: entry.id,
                            error: message,
                        });
                    } else {
                        debug!(id = %entry.id, error = %message, "sync replay stalled at head");
                        report.stalled = true;
                        break;
                    }
                }
            }
        }

        report.pending = self.pending_count();
        if !report.is_clean() {
            self.emit(SyncEvent::ReplayFailed {
                failed: report.failed.len(),
                pending: report.pending,
                message: report.last_error.clone().unwrap_or_default(),
            });
        }
        info!(
            executed = report.executed.len(),
            failed = report.failed.len(),
            pending = report.pending,
            "sync replay finished"
        );
        Ok(report)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().pending_len()
    }

    /// Snapshot of the pending entries, head first.
    pub fn pending(&self) -> Vec<SyncQueueEntry> {
        self.queue.lock().pending().cloned().collect()
    }

    pub fn failed(&self) -> Vec<SyncQueueEntry> {
        self.queue.lock().failed().to_vec()
    }

    /// Drop an entry from the pending or failed list. Returns false if unknown.
    pub async fn cancel(&self, id: &Uuid) -> Result<bool> {
        let _serial = self.drain_lock.lock().await;
        let removed = self.queue.lock().cancel(id).is_some();
        if removed {
            self.persist().await;
        }
        Ok(removed)
    }

    /// Requeue a parked entry at the tail. Returns false if unknown.
    pub async fn retry_failed(&self, id: &Uuid) -> Result<bool> {
        let _serial = self.drain_lock.lock().await;
        let requeued = self.queue.lock().retry_failed(id).is_some();
        if requeued {
            self.persist().await;
        }
        Ok(requeued)
    }

    /// Follow a connectivity channel until its sender goes away.
    pub fn spawn_connectivity_listener(
        self: &Arc<Self>,
        mut connectivity: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let online = *connectivity.borrow_and_update();
                if let Err(e) = coordinator.set_online(online).await {
                    warn!(error = %e, "sync replay failed");
                }
                if connectivity.changed().await.is_err() {
                    debug!("connectivity channel closed; listener stopping");
                    break;
                }
            }
        })
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    /// Best-effort: the in-memory queue stays authoritative if the write fails.
    async fn persist(&self) {
        let bytes = match self.queue.lock().to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "sync queue not serializable");
                return;
            }
        };
        if let Err(e) = io::write(&self.backend, self.queue_path.clone(), bytes).await {
            warn!(error = %e, "failed to persist sync queue");
        }
    }
}

async fn set_aside_corrupt_queue(backend: &SharedBackend, path: &Path) {
    let Ok(Some(bytes)) = io::read(backend, path.to_path_buf()).await else {
        return;
    };
    let aside = path.with_extension(format!(
        "corrupt-{}.json",
        chrono::Utc::now().timestamp_millis()
    ));
    if let Err(e) = io::write(backend, aside.clone(), bytes).await {
        warn!(path = %aside.display(), error = %e, "could not preserve corrupt sync queue");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem_backend::MemBackend;
    use crate::store::StorageBackend;
    use crate::test_utils::ScriptedTransport;
    use serde_json::json;

    fn op(n: u64) -> SyncOp {
        SyncOp::custom("test", json!({ "n": n }))
    }

    async fn coordinator(
        backend: &MemBackend,
        transport: &Arc<ScriptedTransport>,
        online: bool,
    ) -> Arc<SyncCoordinator> {
        SyncCoordinator::open(
            Arc::new(backend.clone()),
            transport.clone(),
            DEFAULT_MAX_ATTEMPTS,
            online,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn online_submit_executes_immediately() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        let sync = coordinator(&backend, &transport, true).await;

        assert_eq!(sync.submit(op(1)).await.unwrap(), SubmitOutcome::Executed);
        assert_eq!(transport.executed(), vec![op(1)]);
        assert_eq!(sync.pending_count(), 0);
    }

    #[tokio::test]
    async fn offline_submits_replay_in_order_exactly_once() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        let sync = coordinator(&backend, &transport, false).await;

        for n in 0..4 {
            assert!(matches!(
                sync.submit(op(n)).await.unwrap(),
                SubmitOutcome::Queued(_)
            ));
        }
        assert!(transport.executed().is_empty());
        assert_eq!(sync.pending_count(), 4);

        let report = sync.set_online(true).await.unwrap().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.executed.len(), 4);
        assert_eq!(transport.executed(), (0..4).map(op).collect::<Vec<_>>());

        // A second drain finds nothing to do.
        sync.drain().await.unwrap();
        assert_eq!(transport.executed().len(), 4);
    }

    #[tokio::test]
    async fn failed_online_submit_is_queued_not_lost() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_next(1);
        let sync = coordinator(&backend, &transport, true).await;

        let outcome = sync.submit(op(1)).await.unwrap();
        let SubmitOutcome::Queued(id) = outcome else {
            panic!("expected queued, got {:?}", outcome);
        };
        let pending = sync.pending();
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].attempts, 1);

        // Later submits wait behind the backlog.
        assert!(matches!(
            sync.submit(op(2)).await.unwrap(),
            SubmitOutcome::Queued(_)
        ));
        sync.drain().await.unwrap();
        assert_eq!(transport.executed(), vec![op(1), op(2)]);
    }

    #[tokio::test]
    async fn failing_head_stops_drain_until_cap_then_parks() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        let sync = coordinator(&backend, &transport, false).await;
        let mut events = sync.subscribe();

        sync.submit(op(1)).await.unwrap();
        sync.submit(op(2)).await.unwrap();
        transport.fail_next(DEFAULT_MAX_ATTEMPTS as usize);

        let report = sync.set_online(true).await.unwrap().unwrap();
        assert!(report.stalled);
        assert_eq!(sync.pending_count(), 2);
        assert!(transport.executed().is_empty());

        sync.drain().await.unwrap();
        let report = sync.drain().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(transport.executed(), vec![op(2)]);
        assert_eq!(sync.failed()[0].op, op(1));
        assert_eq!(sync.failed()[0].attempts, DEFAULT_MAX_ATTEMPTS);

        let mut replay_failures = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SyncEvent::ReplayFailed { .. }) {
                replay_failures += 1;
            }
        }
        // One per drain that hit a failure.
        assert_eq!(replay_failures, 3);
    }

    #[tokio::test]
    async fn queue_survives_reopen() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        {
            let sync = coordinator(&backend, &transport, false).await;
            sync.submit(op(1)).await.unwrap();
            sync.submit(op(2)).await.unwrap();
        }
        assert!(backend.exists(Path::new(QUEUE_PATH)));

        let reopened = coordinator(&backend, &transport, true).await;
        assert_eq!(reopened.pending_count(), 2);
        reopened.drain().await.unwrap();
        assert_eq!(transport.executed(), vec![op(1), op(2)]);
    }

    #[tokio::test]
    async fn corrupt_queue_is_set_aside() {
        let backend = MemBackend::new();
        backend.write(Path::new(QUEUE_PATH), b"{ nope").unwrap();
        let transport = Arc::new(ScriptedTransport::new());

        let sync = coordinator(&backend, &transport, false).await;
        assert_eq!(sync.pending_count(), 0);
        let kept = backend.list(Path::new("sync")).unwrap();
        assert!(kept.iter().any(|e| e.name.contains("corrupt")));
    }

    #[tokio::test]
    async fn retry_and_cancel_failed_entries() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        let sync = SyncCoordinator::open(Arc::new(backend.clone()), transport.clone(), 1, false)
            .await
            .unwrap();

        sync.submit(op(1)).await.unwrap();
        sync.submit(op(2)).await.unwrap();
        transport.fail_next(2);
        sync.set_online(true).await.unwrap();
        assert_eq!(sync.failed().len(), 2);

        let first = sync.failed()[0].id;
        let second = sync.failed()[1].id;
        assert!(sync.retry_failed(&first).await.unwrap());
        assert!(sync.cancel(&second).await.unwrap());
        assert!(!sync.cancel(&second).await.unwrap());

        sync.drain().await.unwrap();
        assert_eq!(transport.executed(), vec![op(1)]);
        assert!(sync.failed().is_empty());
    }

    #[tokio::test]
    async fn retry_cap_comes_from_config() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        let config = FolioConfig {
            sync_max_attempts: 1,
            ..Default::default()
        };
        let sync = SyncCoordinator::from_config(
            Arc::new(backend.clone()),
            transport.clone(),
            &config,
            false,
        )
        .await
        .unwrap();

        sync.submit(op(1)).await.unwrap();
        transport.fail_next(1);
        let report = sync.set_online(true).await.unwrap().unwrap();

        // Parked after a single failure instead of stalling at the head.
        assert_eq!(report.failed.len(), 1);
        assert!(!report.stalled);
        assert_eq!(sync.failed()[0].attempts, 1);
    }

    #[tokio::test]
    async fn connectivity_listener_drives_replay() {
        let backend = MemBackend::new();
        let transport = Arc::new(ScriptedTransport::new());
        let sync = coordinator(&backend, &transport, false).await;
        sync.submit(op(1)).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let listener = sync.spawn_connectivity_listener(rx);
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while sync.pending_count() > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(sync.is_online());
        assert_eq!(transport.executed(), vec![op(1)]);

        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(2), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
