//! # Crash Recovery
//!
//! Recovery records are a side channel, written independently of the primary
//! save path, so a crash between "primary write" and "ledger update" can never
//! lose both copies of an edit.
//!
//! ## Record Layout
//!
//! ```text
//! recovery/
//! └── {millis:013}_{basename}.recovery.json   # {originalPath, content, timestamp, documentId, title}
//! ```
//!
//! The timestamp prefix is strictly increasing per manager, so names sort in
//! write order and never collide.
//!
//! ## Lifecycle
//!
//! 1. **Checkpoint**: every autosave cycle, and every burst of edits, writes a
//!    record. A new record for a document supersedes the one this manager wrote
//!    for it before, so one busy document cannot push other documents' records
//!    out of the retention window.
//! 2. **Scan**: at startup, records whose original file is missing or holds
//!    different content are orphans and get offered to the user. Records that
//!    match what is on disk are stale; they stay until pruned.
//! 3. **Reconcile**: keep or discard, always explicitly. Both remove the record.
//! 4. **Prune**: retention count (oldest first) and maximum age.
//!
//! Checkpoints are best-effort: a failed write is logged and never fails the
//! caller. Unparsable records are skipped and logged, never fatal.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FolioError, Result};
use crate::model::{Document, PersistedDocument, Snapshot};
use crate::store::{io, SharedBackend};

pub const RECOVERY_SUFFIX: &str = ".recovery.json";
pub const DEFAULT_RETENTION: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    /// File name inside the recovery area; filled in when read.
    #[serde(skip)]
    pub name: String,
    pub original_path: Option<PathBuf>,
    pub content: Snapshot,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    Keep,
    Discard,
}

pub struct RecoveryManager {
    backend: SharedBackend,
    dir: PathBuf,
    retention: usize,
    max_age: chrono::Duration,
    last_stamp: AtomicI64,
    written: Mutex<HashMap<Uuid, String>>,
}

impl RecoveryManager {
    pub fn new(backend: SharedBackend, dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            dir: dir.into(),
            retention: DEFAULT_RETENTION,
            max_age: chrono::Duration::days(7),
            last_stamp: AtomicI64::new(0),
            written: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_stamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_stamp
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    fn record_name(stamp: i64, document: &Document) -> String {
        let basename = document
            .file_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.json", document.id));
        format!("{:013}_{}{}", stamp, basename, RECOVERY_SUFFIX)
    }

    fn stamp_of(name: &str) -> Option<i64> {
        name.split('_').next()?.parse().ok()
    }

    /// Write a record of the document's current in-memory content.
    /// Returns `None` (after logging) if the write failed.
    pub async fn checkpoint(&self, document: &Document) -> Option<RecoveryRecord> {
        let stamp = self.next_stamp();
        let name = Self::record_name(stamp, document);
        let record = RecoveryRecord {
            name: name.clone(),
            original_path: document.file_path.clone(),
            content: document.content.clone(),
            timestamp: DateTime::<Utc>::from_timestamp_millis(stamp).unwrap_or_else(Utc::now),
            document_id: Some(document.id),
            title: Some(document.title.clone()),
        };

        let bytes = match serde_json::to_vec_pretty(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(document = %document.id, error = %e, "recovery checkpoint not serializable");
                return None;
            }
        };

        if let Err(e) = io::write(&self.backend, self.dir.join(&name), bytes).await {
            warn!(document = %document.id, error = %e, "recovery checkpoint failed");
            return None;
        }
        debug!(document = %document.id, record = %name, "recovery checkpoint written");

        let superseded = self.written.lock().insert(document.id, name);
        if let Some(old) = superseded {
            if let Err(e) = io::remove(&self.backend, self.dir.join(&old)).await {
                warn!(record = %old, error = %e, "could not remove superseded recovery record");
            }
        }

        Some(record)
    }

    async fn read_record(&self, name: &str) -> Result<Option<RecoveryRecord>> {
        let Some(bytes) = io::read(&self.backend, self.dir.join(name)).await? else {
            return Ok(None);
        };
        let mut record: RecoveryRecord =
            serde_json::from_slice(&bytes).map_err(|e| FolioError::RecoveryCorrupt {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        record.name = name.to_string();
        Ok(Some(record))
    }

    async fn record_names(&self) -> Result<Vec<String>> {
        Ok(io::list(&self.backend, self.dir.clone())
            .await?
            .into_iter()
            .map(|e| e.name)
            .filter(|n| n.ends_with(RECOVERY_SUFFIX))
            .collect())
    }

    /// Every readable record, newest first. Corrupt ones are logged and skipped.
    pub async fn records(&self) -> Result<Vec<RecoveryRecord>> {
        let mut records = Vec::new();
        for name in self.record_names().await? {
            match self.read_record(&name).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e @ FolioError::RecoveryCorrupt { .. }) => {
                    warn!(error = %e, "skipping corrupt recovery record");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(records)
    }

    /// Records whose edits may not have reached primary storage, newest first.
    pub async fn scan_for_orphans(&self) -> Result<Vec<RecoveryRecord>> {
        let mut orphans = Vec::new();
        for record in self.records().await? {
            if self.is_orphan(&record).await {
                orphans.push(record);
            }
        }
        info!(count = orphans.len(), "recovery scan finished");
        Ok(orphans)
    }

    async fn is_orphan(&self, record: &RecoveryRecord) -> bool {
        let Some(original) = &record.original_path else {
            return true;
        };
        let bytes = match io::read(&self.backend, original.clone()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return true,
            Err(e) => {
                warn!(path = %original.display(), error = %e, "original unreadable during scan");
                return true;
            }
        };
        match PersistedDocument::from_bytes(&bytes) {
            Ok(persisted) => persisted.content != record.content,
            Err(_) => true,
        }
    }

    /// Apply the user's decision. Keep hands back the recovered content;
    /// both choices delete the record.
    pub async fn reconcile(
        &self,
        record: &RecoveryRecord,
        choice: RecoveryChoice,
    ) -> Result<Option<Snapshot>> {
        io::remove(&self.backend, self.dir.join(&record.name)).await?;
        self.forget(&record.name);
        info!(record = %record.name, ?choice, "recovery record reconciled");
        Ok(match choice {
            RecoveryChoice::Keep => Some(record.content.clone()),
            RecoveryChoice::Discard => None,
        })
    }

    /// Remove every record belonging to `document_id`.
    pub async fn discard_for(&self, document_id: &Uuid) -> Result<usize> {
        let mut removed = 0;
        for record in self.records().await? {
            if record.document_id.as_ref() == Some(document_id) {
                io::remove(&self.backend, self.dir.join(&record.name)).await?;
                removed += 1;
            }
        }
        self.written.lock().remove(document_id);
        Ok(removed)
    }

    /// Enforce max age and retention count, oldest first.
    pub async fn prune(&self) -> Result<usize> {
        let mut names = self.record_names().await?;
        // Zero-padded stamps: lexical order is chronological.
        names.sort();

        let cutoff = (Utc::now() - self.max_age).timestamp_millis();
        let mut doomed: Vec<String> = Vec::new();
        let mut kept: Vec<String> = Vec::new();
        for name in names {
            match Self::stamp_of(&name) {
                Some(stamp) if stamp < cutoff => doomed.push(name),
                _ => kept.push(name),
            }
        }
        let overflow = kept.len().saturating_sub(self.retention);
        doomed.extend(kept.drain(..overflow));

        for name in &doomed {
            io::remove(&self.backend, self.dir.join(name)).await?;
            self.forget(name);
        }
        if !doomed.is_empty() {
            debug!(removed = doomed.len(), "recovery records pruned");
        }
        Ok(doomed.len())
    }

    fn forget(&self, name: &str) {
        self.written.lock().retain(|_, written| written != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem_backend::MemBackend;
    use crate::store::StorageBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn manager(backend: &MemBackend) -> RecoveryManager {
        RecoveryManager::new(Arc::new(backend.clone()), "recovery")
    }

    fn doc_with(text: &str) -> Document {
        Document::new("Draft", Snapshot::new(json!({ "text": text })))
    }

    #[tokio::test]
    async fn checkpoint_uses_timestamped_name() {
        let backend = MemBackend::new();
        let recovery = manager(&backend);
        let mut doc = doc_with("a");
        doc.file_path = Some(PathBuf::from("notes/plan.json"));

        let record = recovery.checkpoint(&doc).await.unwrap();
        assert!(record.name.ends_with("_plan.json.recovery.json"));
        assert_eq!(record.name.split('_').next().unwrap().len(), 13);
        assert!(backend.exists(&Path::new("recovery").join(&record.name)));

        let raw: serde_json::Value = serde_json::from_slice(
            &backend
                .read(&Path::new("recovery").join(&record.name))
                .unwrap()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(raw["originalPath"], "notes/plan.json");
        assert_eq!(raw["content"], json!({ "text": "a" }));
        assert!(raw.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn newer_checkpoint_supersedes_same_document() {
        let backend = MemBackend::new();
        let recovery = manager(&backend);
        let mut doc = doc_with("a");

        recovery.checkpoint(&doc).await.unwrap();
        doc.content = Snapshot::new(json!({ "text": "b" }));
        recovery.checkpoint(&doc).await.unwrap();

        let records = recovery.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, doc.content);
    }

    #[tokio::test]
    async fn prune_keeps_five_newest_of_seven() {
        let backend = MemBackend::new();
        let recovery = manager(&backend).with_retention(5);

        let mut written = Vec::new();
        for n in 0..7 {
            let record = recovery.checkpoint(&doc_with(&n.to_string())).await.unwrap();
            written.push(record.name);
        }

        let removed = recovery.prune().await.unwrap();
        assert_eq!(removed, 2);

        let mut remaining: Vec<String> = recovery
            .records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        remaining.sort();
        assert_eq!(remaining, written[2..].to_vec());
    }

    #[tokio::test]
    async fn prune_drops_records_past_max_age() {
        let backend = MemBackend::new();
        let recovery = manager(&backend).with_max_age(chrono::Duration::days(7));

        let old_stamp = (Utc::now() - chrono::Duration::days(8)).timestamp_millis();
        let old_name = format!("{:013}_old.json{}", old_stamp, RECOVERY_SUFFIX);
        backend
            .write(
                &Path::new("recovery").join(&old_name),
                &serde_json::to_vec(&json!({
                    "originalPath": null,
                    "content": {},
                    "timestamp": Utc::now(),
                }))
                .unwrap(),
            )
            .unwrap();
        recovery.checkpoint(&doc_with("fresh")).await.unwrap();

        assert_eq!(recovery.prune().await.unwrap(), 1);
        assert!(!backend.exists(&Path::new("recovery").join(&old_name)));
        assert_eq!(recovery.records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scan_skips_corrupt_records() {
        let backend = MemBackend::new();
        let recovery = manager(&backend);
        backend
            .write(
                Path::new("recovery/0000000000001_bad.json.recovery.json"),
                b"{ not json",
            )
            .unwrap();
        recovery.checkpoint(&doc_with("ok")).await.unwrap();

        let orphans = recovery.scan_for_orphans().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].content, Snapshot::new(json!({ "text": "ok" })));
    }

    #[tokio::test]
    async fn scan_ignores_records_matching_primary_file() {
        let backend = MemBackend::new();
        let recovery = manager(&backend);

        let mut doc = doc_with("saved");
        doc.file_path = Some(PathBuf::from("documents/saved.json"));
        let persisted = PersistedDocument::from_parts(&doc, vec![]);
        backend
            .write(Path::new("documents/saved.json"), &persisted.to_bytes().unwrap())
            .unwrap();
        recovery.checkpoint(&doc).await.unwrap();

        let mut unsaved = doc_with("unsaved");
        unsaved.file_path = Some(PathBuf::from("documents/other.json"));
        recovery.checkpoint(&unsaved).await.unwrap();

        let orphans = recovery.scan_for_orphans().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].content, unsaved.content);
    }

    #[tokio::test]
    async fn reconcile_is_explicit_and_removes_record() {
        let backend = MemBackend::new();
        let recovery = manager(&backend);
        let kept = recovery.checkpoint(&doc_with("keep me")).await.unwrap();
        let dropped = recovery.checkpoint(&doc_with("drop me")).await.unwrap();

        let content = recovery
            .reconcile(&kept, RecoveryChoice::Keep)
            .await
            .unwrap();
        assert_eq!(content, Some(kept.content.clone()));

        let content = recovery
            .reconcile(&dropped, RecoveryChoice::Discard)
            .await
            .unwrap();
        assert!(content.is_none());
        assert!(recovery.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_checkpoint_is_swallowed() {
        let backend = MemBackend::new();
        backend.set_simulate_write_error(true);
        let recovery = manager(&backend);
        assert!(recovery.checkpoint(&doc_with("x")).await.is_none());
    }

    #[tokio::test]
    async fn discard_for_removes_only_that_document() {
        let backend = MemBackend::new();
        let recovery = manager(&backend);
        let doc = doc_with("mine");
        let other = doc_with("theirs");
        recovery.checkpoint(&doc).await.unwrap();
        recovery.checkpoint(&other).await.unwrap();

        assert_eq!(recovery.discard_for(&doc.id).await.unwrap(), 1);
        let records = recovery.records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].document_id, Some(other.id));
    }
}
