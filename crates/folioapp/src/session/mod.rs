//! # Document Session
//!
//! The [`DocumentSession`] owns the lifecycle of one active document: load or
//! create, edit, save, close. It ties together the storage backend, the
//! version ledger, the recovery manager, the autosave scheduler, the change
//! watcher and, optionally, the sync coordinator.
//!
//! ## Ownership
//!
//! There is no global instance. Whoever needs a session constructs one with
//! [`DocumentSession::new`] and tears it down by closing or dropping it.
//! Dropping aborts every background task, which is also how an unclean
//! shutdown looks from the engine's side.
//!
//! ## Concurrency
//!
//! - Session state lives behind a `parking_lot::Mutex` that is never held
//!   across an `.await`.
//! - Writes of the active document are serialized by an async write lock.
//!   [`DocumentSession::close`] takes it too, so no write of a closed document
//!   outlives `close`.
//! - Background work (autosave ticks, recovery checkpoints, external change
//!   checks) runs on one worker task, in arrival order. See [`worker`].
//!
//! ## Dirty Tracking
//!
//! Every mutation bumps a revision counter. A save captures the revision it
//! started from and only clears the dirty flag if no mutation landed while the
//! write was in flight.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::autosave::{self, AutosaveScheduler, InFlight};
use crate::config::{FolioConfig, DOCUMENTS_DIR, RECOVERY_DIR};
use crate::error::{FolioError, Result};
use crate::events::{SessionEvent, EVENT_CAPACITY};
use crate::ledger::{VersionLedger, DEFAULT_MAX_VERSIONS};
use crate::model::{
    document_path, Document, DocumentSummary, Locator, PersistedDocument, Snapshot, Version,
};
use crate::recovery::{RecoveryChoice, RecoveryManager, RecoveryRecord, DEFAULT_RETENTION};
use crate::store::{content_digest, io, SharedBackend};
use crate::sync::{SyncCoordinator, SyncOp};
use crate::watcher::ChangeWatcher;

pub mod worker;

use worker::WorkerMsg;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub autosave_interval: Duration,
    pub max_versions: usize,
    pub recovery_retention: usize,
    pub recovery_max_age: chrono::Duration,
    pub documents_dir: PathBuf,
    pub recovery_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_interval: autosave::DEFAULT_AUTOSAVE_INTERVAL,
            max_versions: DEFAULT_MAX_VERSIONS,
            recovery_retention: DEFAULT_RETENTION,
            recovery_max_age: chrono::Duration::days(7),
            documents_dir: PathBuf::from(DOCUMENTS_DIR),
            recovery_dir: PathBuf::from(RECOVERY_DIR),
        }
    }
}

impl From<&FolioConfig> for SessionConfig {
    fn from(config: &FolioConfig) -> Self {
        Self {
            autosave_interval: config.autosave_interval(),
            max_versions: config.max_versions,
            recovery_retention: config.recovery_retention,
            recovery_max_age: config.recovery_max_age(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Save,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoDocument,
    NotDirty,
    NotDue,
    InFlight,
}

#[derive(Debug)]
pub enum AutosaveOutcome {
    Saved(Version),
    Skipped(SkipReason),
    Failed(FolioError),
}

pub(crate) struct ActiveDocument {
    pub(crate) document: Document,
    pub(crate) ledger: VersionLedger,
    pub(crate) revision: u64,
    pub(crate) checkpointed_revision: u64,
    /// Digest of the bytes this session last wrote successfully.
    pub(crate) persisted_digest: Option<String>,
    /// Digest of a write that is in flight right now.
    pub(crate) pending_digest: Option<String>,
    pub(crate) last_saved_at: Option<Instant>,
}

#[derive(Default)]
pub(crate) struct SessionState {
    pub(crate) active: Option<ActiveDocument>,
}

pub(crate) struct Shared {
    pub(crate) backend: SharedBackend,
    pub(crate) config: SessionConfig,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) write_lock: tokio::sync::Mutex<()>,
    pub(crate) checkpoint_lock: tokio::sync::Mutex<()>,
    pub(crate) autosave: InFlight,
    pub(crate) recovery: RecoveryManager,
    pub(crate) watcher: Mutex<ChangeWatcher>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) sync: Option<Arc<SyncCoordinator>>,
}

pub struct DocumentSession {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
    messages: mpsc::UnboundedSender<WorkerMsg>,
    ticks: mpsc::Sender<Instant>,
    scheduler: Option<AutosaveScheduler>,
}

impl DocumentSession {
    /// Must be called inside a tokio runtime: the worker task starts here.
    pub fn new(backend: SharedBackend, config: SessionConfig) -> Self {
        Self::build(backend, config, None)
    }

    /// Like [`new`](Self::new), with explicit saves pushed through `sync`.
    pub fn with_sync(
        backend: SharedBackend,
        config: SessionConfig,
        sync: Arc<SyncCoordinator>,
    ) -> Self {
        Self::build(backend, config, Some(sync))
    }

    fn build(
        backend: SharedBackend,
        config: SessionConfig,
        sync: Option<Arc<SyncCoordinator>>,
    ) -> Self {
        let (messages, messages_rx) = mpsc::unbounded_channel();
        let (ticks, ticks_rx) = mpsc::channel(1);
        let (changes, changes_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let recovery = RecoveryManager::new(Arc::clone(&backend), config.recovery_dir.clone())
            .with_retention(config.recovery_retention)
            .with_max_age(config.recovery_max_age);
        let watcher = ChangeWatcher::new(Arc::clone(&backend), changes);

        let shared = Arc::new(Shared {
            backend,
            config,
            state: Mutex::new(SessionState::default()),
            write_lock: tokio::sync::Mutex::new(()),
            checkpoint_lock: tokio::sync::Mutex::new(()),
            autosave: InFlight::default(),
            recovery,
            watcher: Mutex::new(watcher),
            events,
            sync,
        });

        let worker = tokio::spawn(worker::run(
            Arc::clone(&shared),
            messages_rx,
            ticks_rx,
            changes_rx,
        ));
        debug!(backend = %shared.backend.describe(), "document session started");

        Self {
            shared,
            worker,
            messages,
            ticks,
            scheduler: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// A copy of the active document.
    pub fn document(&self) -> Option<Document> {
        self.shared
            .state
            .lock()
            .active
            .as_ref()
            .map(|a| a.document.clone())
    }

    pub fn is_dirty(&self) -> bool {
        self.shared
            .state
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| a.document.dirty)
    }

    /// True while an autosave timer is running for the active document.
    pub fn is_autosave_running(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.is_running())
    }

    /// The path currently watched for foreign changes.
    pub fn watched_path(&self) -> Option<PathBuf> {
        self.shared.watcher.lock().watched().map(Path::to_path_buf)
    }

    fn ensure_replaceable(&self) -> Result<()> {
        match self.shared.state.lock().active.as_ref() {
            Some(active) if active.document.dirty => {
                Err(FolioError::UnsavedChanges(active.document.id))
            }
            _ => Ok(()),
        }
    }

    fn activate(&mut self, document: Document, ledger: VersionLedger, digest: Option<String>) {
        let location = document.file_path.clone();
        self.shared.state.lock().active = Some(ActiveDocument {
            document,
            ledger,
            revision: 0,
            checkpointed_revision: 0,
            persisted_digest: digest,
            pending_digest: None,
            last_saved_at: None,
        });

        {
            let mut watcher = self.shared.watcher.lock();
            match &location {
                Some(path) => watcher.attach_or_warn(path),
                None => watcher.detach(),
            }
        }

        self.scheduler = Some(AutosaveScheduler::spawn(
            self.shared.config.autosave_interval,
            self.ticks.clone(),
        ));
    }

    /// Make the document at `locator` active. Refuses to replace a document
    /// with unsaved changes.
    pub async fn load(&mut self, locator: &Locator) -> Result<Document> {
        self.ensure_replaceable()?;

        let path = locator.resolve(&self.shared.config.documents_dir);
        let bytes = io::read(&self.shared.backend, path.clone())
            .await?
            .ok_or_else(|| FolioError::NotFound(locator.to_string()))?;
        let digest = content_digest(&bytes);
        let (document, versions) = PersistedDocument::from_bytes(&bytes)?.into_parts(&path);

        let mut ledger = VersionLedger::from_versions(versions, self.shared.config.max_versions);
        if ledger.newest().map(|v| &v.content) != Some(&document.content) {
            // Baseline so the loaded content is always restorable.
            ledger.append(document.content.clone(), false);
        }

        info!(
            id = %document.id,
            path = %path.display(),
            versions = ledger.len(),
            "document loaded"
        );
        self.activate(document.clone(), ledger, Some(digest));
        self.shared.emit(SessionEvent::Loaded {
            id: document.id,
            path,
        });
        Ok(document)
    }

    /// Start a new, clean, unlocated document.
    pub fn create_empty(&mut self, title: impl Into<String>) -> Result<Document> {
        self.ensure_replaceable()?;

        let document = Document::empty(title);
        info!(id = %document.id, "document created");
        self.activate(
            document.clone(),
            VersionLedger::new(self.shared.config.max_versions),
            None,
        );
        self.shared.emit(SessionEvent::Created { id: document.id });
        Ok(document)
    }

    /// Replace the in-memory content. Never touches the primary file; a
    /// recovery checkpoint is taken in the background.
    pub fn mutate(&self, content: Snapshot) -> Result<u64> {
        let (id, revision) = {
            let mut state = self.shared.state.lock();
            let active = state.active.as_mut().ok_or(FolioError::NoActiveDocument)?;
            active.document.content = content;
            active.document.dirty = true;
            active.document.updated_at = Utc::now();
            active.revision += 1;
            (active.document.id, active.revision)
        };

        self.shared.emit(SessionEvent::Dirty { id, revision });
        let _ = self.messages.send(WorkerMsg::Checkpoint);
        Ok(revision)
    }

    pub async fn save(&self, explicit: bool) -> Result<Version> {
        let version = self.shared.save(explicit, None).await?;
        if explicit {
            self.shared.push_to_sync().await;
        }
        Ok(version)
    }

    /// Explicit save to a new location, which becomes the document's home.
    pub async fn save_as(&self, path: impl Into<PathBuf>) -> Result<Version> {
        let version = self.shared.save(true, Some(path.into())).await?;
        self.shared.push_to_sync().await;
        Ok(version)
    }

    /// Run one autosave cycle as if the timer had fired.
    pub async fn autosave_now(&self) -> AutosaveOutcome {
        self.shared.autosave_cycle().await
    }

    /// Save or discard pending changes, then tear down the watcher and the
    /// scheduler. If the save fails the session stays open.
    pub async fn close(&mut self, action: CloseAction) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let pushed = {
            let _write = shared.write_lock.lock().await;

            let (id, dirty) = match shared.state.lock().active.as_ref() {
                Some(active) => (active.document.id, active.document.dirty),
                None => return Ok(()),
            };

            let saved = match action {
                CloseAction::Save if dirty => {
                    shared.save_locked(true, None).await?;
                    true
                }
                CloseAction::Save => false,
                CloseAction::Discard => {
                    if let Err(e) = shared.recovery.discard_for(&id).await {
                        warn!(id = %id, error = %e, "could not remove recovery records on discard");
                    }
                    false
                }
            };

            let closing = shared.state.lock().active.take();
            shared.watcher.lock().detach();
            if let Some(scheduler) = self.scheduler.take() {
                scheduler.cancel();
            }

            if let Err(e) = shared.recovery.prune().await {
                warn!(error = %e, "recovery prune failed");
            }
            info!(id = %id, ?action, "document closed");
            shared.emit(SessionEvent::Closed { id });

            closing.filter(|_| saved)
        };

        if let Some(closed) = pushed {
            shared.push_document(&closed.document).await;
        }
        Ok(())
    }

    /// Newest first.
    pub fn versions(&self) -> Result<Vec<Version>> {
        let state = self.shared.state.lock();
        let active = state.active.as_ref().ok_or(FolioError::NoActiveDocument)?;
        Ok(active.ledger.to_vec())
    }

    /// Historical content of a version. Apply it with [`mutate`](Self::mutate).
    pub fn restore_version(&self, id: &Uuid) -> Result<Snapshot> {
        let state = self.shared.state.lock();
        let active = state.active.as_ref().ok_or(FolioError::NoActiveDocument)?;
        active.ledger.restore(id)
    }

    /// Persisted documents in the documents area, most recently updated first.
    /// Files that do not parse are skipped.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let dir = self.shared.config.documents_dir.clone();
        let mut summaries = Vec::new();
        for entry in io::list(&self.shared.backend, dir).await? {
            if !entry.name.ends_with(".json") {
                continue;
            }
            let Some(bytes) = io::read(&self.shared.backend, entry.path.clone()).await? else {
                continue;
            };
            match PersistedDocument::from_bytes(&bytes) {
                Ok(doc) => summaries.push(DocumentSummary {
                    id: doc.id,
                    title: doc.title,
                    path: entry.path,
                    updated_at: doc.updated_at,
                    version_count: doc.versions.len(),
                }),
                Err(e) => {
                    warn!(path = %entry.path.display(), error = %e, "skipping unreadable document")
                }
            }
        }
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Delete a persisted document and its recovery records. The active
    /// document cannot be deleted; close it first.
    pub async fn delete_document(&self, locator: &Locator) -> Result<()> {
        let path = locator.resolve(&self.shared.config.documents_dir);
        let active_here = self
            .shared
            .state
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| a.document.file_path.as_deref() == Some(path.as_path()));
        if active_here {
            return Err(FolioError::Store(format!(
                "{} is open; close it before deleting",
                path.display()
            )));
        }

        let bytes = io::read(&self.shared.backend, path.clone())
            .await?
            .ok_or_else(|| FolioError::NotFound(locator.to_string()))?;
        let id = PersistedDocument::from_bytes(&bytes).ok().map(|d| d.id);

        io::remove(&self.shared.backend, path.clone()).await?;
        info!(path = %path.display(), "document deleted");

        if let Some(id) = id {
            if let Err(e) = self.shared.recovery.discard_for(&id).await {
                warn!(id = %id, error = %e, "could not remove recovery records of deleted doc");
            }
            if let Some(sync) = &self.shared.sync {
                if let Err(e) = sync.submit(SyncOp::delete_document(id)).await {
                    warn!(id = %id, error = %e, "could not submit remote delete");
                }
            }
            self.shared.emit(SessionEvent::Deleted { id, path });
        }
        Ok(())
    }

    /// Recovery records whose edits may never have reached primary storage.
    pub async fn scan_for_orphans(&self) -> Result<Vec<RecoveryRecord>> {
        let orphans = self.shared.recovery.scan_for_orphans().await?;
        if !orphans.is_empty() {
            self.shared.emit(SessionEvent::RecoveryAvailable {
                count: orphans.len(),
            });
        }
        Ok(orphans)
    }

    /// Resolve one orphan. Keep returns the recovered content for the caller
    /// to apply; both choices remove the record.
    pub async fn recover(
        &self,
        record: &RecoveryRecord,
        choice: RecoveryChoice,
    ) -> Result<Option<Snapshot>> {
        let content = self.shared.recovery.reconcile(record, choice).await?;
        self.shared.emit(SessionEvent::Recovered {
            record: record.name.clone(),
            document: record.document_id,
            kept: choice == RecoveryChoice::Keep,
        });
        Ok(content)
    }

    /// Apply recovery retention rules now.
    pub async fn prune_recovery(&self) -> Result<usize> {
        self.shared.recovery.prune().await
    }

    /// Wait until the worker has handled everything dispatched before this call.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.messages.send(WorkerMsg::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.scheduler = None;
        self.worker.abort();
    }
}

impl Shared {
    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn save(&self, explicit: bool, target: Option<PathBuf>) -> Result<Version> {
        let _write = self.write_lock.lock().await;
        self.save_locked(explicit, target).await
    }

    /// Caller holds the write lock.
    async fn save_locked(&self, explicit: bool, target: Option<PathBuf>) -> Result<Version> {
        let (mut document, mut ledger, revision) = {
            let state = self.state.lock();
            let active = state.active.as_ref().ok_or(FolioError::NoActiveDocument)?;
            (
                active.document.clone(),
                active.ledger.clone(),
                active.revision,
            )
        };

        let location = target
            .or_else(|| document.file_path.clone())
            .unwrap_or_else(|| document_path(&self.config.documents_dir, &document.id));
        let now = Utc::now();
        document.file_path = Some(location.clone());
        document.updated_at = now;
        if !explicit {
            document.last_autosave_at = Some(now);
        }

        // Append to a copy; the real ledger only changes once the write landed.
        let version = ledger.append(document.content.clone(), !explicit);
        let bytes = PersistedDocument::from_parts(&document, ledger.to_vec()).to_bytes()?;
        let digest = content_digest(&bytes);
        self.with_active(document.id, |active| {
            active.pending_digest = Some(digest.clone())
        });

        if let Err(e) = io::write(&self.backend, location.clone(), bytes).await {
            self.with_active(document.id, |active| active.pending_digest = None);
            warn!(id = %document.id, path = %location.display(), error = %e, "save failed");
            return Err(e);
        }

        let mut checkpoint_behind = false;
        self.with_active(document.id, |active| {
            checkpoint_behind = active.checkpointed_revision < revision;
            active.ledger = ledger;
            active.persisted_digest = Some(digest);
            active.pending_digest = None;
            active.last_saved_at = Some(Instant::now());
            active.document.file_path = Some(location.clone());
            active.document.updated_at = now;
            if !explicit {
                active.document.last_autosave_at = Some(now);
            }
            if active.revision == revision {
                active.document.dirty = false;
            }
        });

        self.watcher.lock().attach_or_warn(&location);
        if checkpoint_behind {
            // A checkpoint may still hold content older than the file.
            self.checkpoint().await;
        }

        info!(
            id = %document.id,
            path = %location.display(),
            version = %version.id,
            auto = !explicit,
            "document saved"
        );
        self.emit(SessionEvent::Saved {
            id: document.id,
            version: version.id,
            path: location,
            auto: !explicit,
        });
        Ok(version)
    }

    fn with_active(&self, id: Uuid, f: impl FnOnce(&mut ActiveDocument)) {
        let mut state = self.state.lock();
        if let Some(active) = state.active.as_mut().filter(|a| a.document.id == id) {
            f(active);
        }
    }

    pub(crate) async fn autosave_cycle(&self) -> AutosaveOutcome {
        let Some(_in_flight) = self.autosave.try_begin() else {
            debug!("autosave already in flight; skipping");
            return AutosaveOutcome::Skipped(SkipReason::InFlight);
        };

        let (id, dirty, last_saved_at) = match self.state.lock().active.as_ref() {
            Some(active) => (
                active.document.id,
                active.document.dirty,
                active.last_saved_at,
            ),
            None => return AutosaveOutcome::Skipped(SkipReason::NoDocument),
        };
        if !dirty {
            return AutosaveOutcome::Skipped(SkipReason::NotDirty);
        }
        if !autosave::is_due(last_saved_at, self.config.autosave_interval, Instant::now()) {
            debug!(id = %id, "autosave not due yet");
            return AutosaveOutcome::Skipped(SkipReason::NotDue);
        }

        match self.save(false, None).await {
            Ok(version) => {
                self.checkpoint().await;
                AutosaveOutcome::Saved(version)
            }
            // Closed while this tick waited for the write lock.
            Err(FolioError::NoActiveDocument) => {
                AutosaveOutcome::Skipped(SkipReason::NoDocument)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "autosave failed; will retry next tick");
                self.emit(SessionEvent::AutosaveFailed {
                    id,
                    error: e.to_string(),
                });
                AutosaveOutcome::Failed(e)
            }
        }
    }

    /// Record the active document's current content in the recovery area.
    /// Checkpoints are serialized so a later one always captures later content.
    pub(crate) async fn checkpoint(&self) {
        let _serial = self.checkpoint_lock.lock().await;
        let mut document = {
            let mut state = self.state.lock();
            let Some(active) = state.active.as_mut() else {
                return;
            };
            active.checkpointed_revision = active.revision;
            active.document.clone()
        };
        if document.file_path.is_none() {
            // Where the first save will put it; absent until then.
            document.file_path = Some(document_path(&self.config.documents_dir, &document.id));
        }
        self.recovery.checkpoint(&document).await;
    }

    /// Checkpoint only if edits happened since the last checkpoint.
    pub(crate) async fn checkpoint_if_behind(&self) {
        let behind = self
            .state
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| a.document.dirty && a.revision > a.checkpointed_revision);
        if behind {
            self.checkpoint().await;
        }
    }

    /// Compare what is stored at `path` with what this session wrote there.
    pub(crate) async fn check_external_change(&self, path: PathBuf) {
        let (id, persisted, pending) = {
            let state = self.state.lock();
            let Some(active) = state
                .active
                .as_ref()
                .filter(|a| a.document.file_path.as_deref() == Some(path.as_path()))
            else {
                return;
            };
            (
                active.document.id,
                active.persisted_digest.clone(),
                active.pending_digest.clone(),
            )
        };

        let current = match io::read(&self.backend, path.clone()).await {
            Ok(bytes) => bytes.as_deref().map(content_digest),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read changed document");
                return;
            }
        };

        let ours = match &current {
            Some(digest) => {
                Some(digest) == persisted.as_ref() || Some(digest) == pending.as_ref()
            }
            None => persisted.is_none(),
        };
        if !ours {
            warn!(id = %id, path = %path.display(), "document changed outside this session");
            self.emit(SessionEvent::ConflictDetected { id, path });
        }
    }

    async fn push_to_sync(&self) {
        if self.sync.is_none() {
            return;
        }
        let document = self
            .state
            .lock()
            .active
            .as_ref()
            .map(|a| a.document.clone());
        if let Some(document) = document {
            self.push_document(&document).await;
        }
    }

    async fn push_document(&self, document: &Document) {
        let Some(sync) = &self.sync else {
            return;
        };
        let op = SyncOp::push_document(
            document.id,
            json!({
                "title": document.title,
                "path": document.file_path,
                "content": document.content,
                "updatedAt": document.updated_at,
            }),
        );
        if let Err(e) = sync.submit(op).await {
            warn!(id = %document.id, error = %e, "could not submit document push");
        }
    }
}
