//! The persisted FIFO backlog behind [`super::SyncCoordinator`].
//!
//! Stored as one JSON file (`sync/queue.json`) holding the pending entries in
//! submission order, the entries parked after too many failed attempts, and
//! the next sequence number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{io, SharedBackend};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOpKind {
    PushDocument,
    DeleteDocument,
    ValidateLicense,
    Custom(String),
}

/// A network-dependent operation, serializable so it survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOp {
    pub kind: SyncOpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SyncOp {
    pub fn new(kind: SyncOpKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            document_id: None,
            payload,
        }
    }

    pub fn push_document(document_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            kind: SyncOpKind::PushDocument,
            document_id: Some(document_id),
            payload,
        }
    }

    pub fn delete_document(document_id: Uuid) -> Self {
        Self {
            kind: SyncOpKind::DeleteDocument,
            document_id: Some(document_id),
            payload: serde_json::Value::Null,
        }
    }

    pub fn validate_license(key: impl Into<String>) -> Self {
        Self::new(
            SyncOpKind::ValidateLicense,
            serde_json::json!({ "key": key.into() }),
        )
    }

    pub fn custom(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new(SyncOpKind::Custom(name.into()), payload)
    }

    pub fn label(&self) -> String {
        match &self.kind {
            SyncOpKind::PushDocument => "push_document".to_string(),
            SyncOpKind::DeleteDocument => "delete_document".to_string(),
            SyncOpKind::ValidateLicense => "validate_license".to_string(),
            SyncOpKind::Custom(name) => format!("custom:{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    pub id: Uuid,
    pub seq: u64,
    pub op: SyncOp,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueue {
    #[serde(default)]
    next_seq: u64,
    #[serde(default)]
    pending: VecDeque<SyncQueueEntry>,
    #[serde(default)]
    failed: Vec<SyncQueueEntry>,
}

impl SyncQueue {
    pub fn enqueue(
        &mut self,
        op: SyncOp,
        attempts: u32,
        last_error: Option<String>,
    ) -> SyncQueueEntry {
        self.next_seq += 1;
        let entry = SyncQueueEntry {
            id: Uuid::new_v4(),
            seq: self.next_seq,
            op,
            queued_at: Utc::now(),
            attempts,
            last_error,
        };
        self.pending.push_back(entry.clone());
        entry
    }

    pub fn front(&self) -> Option<&SyncQueueEntry> {
        self.pending.front()
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut SyncQueueEntry> {
        self.pending.front_mut()
    }

    pub(crate) fn pop_front(&mut self) -> Option<SyncQueueEntry> {
        self.pending.pop_front()
    }

    /// Move the head entry to the failed list.
    pub(crate) fn park_front(&mut self) -> Option<SyncQueueEntry> {
        let entry = self.pending.pop_front()?;
        self.failed.push(entry.clone());
        Some(entry)
    }

    /// Remove an entry from either list.
    pub fn cancel(&mut self, id: &Uuid) -> Option<SyncQueueEntry> {
        if let Some(pos) = self.pending.iter().position(|e| e.id == *id) {
            return self.pending.remove(pos);
        }
        let pos = self.failed.iter().position(|e| e.id == *id)?;
        Some(self.failed.remove(pos))
    }

    /// Put a failed entry back at the tail of the pending queue with a fresh
    /// attempt budget.
    pub fn retry_failed(&mut self, id: &Uuid) -> Option<SyncQueueEntry> {
        let pos = self.failed.iter().position(|e| e.id == *id)?;
        let mut entry = self.failed.remove(pos);
        entry.attempts = 0;
        self.next_seq += 1;
        entry.seq = self.next_seq;
        self.pending.push_back(entry.clone());
        Some(entry)
    }

    pub fn pending(&self) -> impl Iterator<Item = &SyncQueueEntry> + '_ {
        self.pending.iter()
    }

    pub fn failed(&self) -> &[SyncQueueEntry] {
        &self.failed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_backlog(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Read the persisted queue. A missing file is an empty queue.
pub async fn load_queue(backend: &SharedBackend, path: &Path) -> Result<SyncQueue> {
    match io::read(backend, path.to_path_buf()).await? {
        Some(bytes) => SyncQueue::from_bytes(&bytes),
        None => Ok(SyncQueue::default()),
    }
}
