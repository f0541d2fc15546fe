//! # Domain Model
//!
//! This module defines the data that flows through the engine: [`Document`],
//! [`Version`], [`Snapshot`] and the on-disk [`PersistedDocument`].
//!
//! ## Snapshots Are Opaque
//!
//! The editor hands us a [`Snapshot`], a complete serializable picture of its
//! content at one point in time. The engine never looks inside: it stores,
//! compares and returns snapshots whole. Versions are full snapshots, not deltas.
//!
//! ## Persisted Layout
//!
//! A saved document is a single pretty-printed JSON file:
//!
//! ```text
//! {
//!   "id": "…", "title": "…", "content": { … },
//!   "filePath": "documents/….json",
//!   "versions": [ { "id": "…", "seq": 3, "content": { … }, "createdAt": "…",
//!                   "isAutoSave": true, "size": 42 }, … ],
//!   "createdAt": "…", "updatedAt": "…", "lastAutoSaveAt": "…"
//! }
//! ```
//!
//! `versions` is stored newest-first, the same order the ledger keeps in memory.
//!
//! ## Locators
//!
//! Documents are addressed either by storage path or by id. An id resolves to
//! `{documents_dir}/{id}.json`, which is also where a never-saved document lands
//! on its first save.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Result;

/// Opaque editor content. Compared and stored whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(serde_json::Value);

impl Snapshot {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The content of a freshly created document: one empty paragraph block.
    pub fn skeleton() -> Self {
        Self(json!({
            "blocks": [
                { "type": "paragraph", "data": { "text": "" } }
            ]
        }))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Serialized size in bytes.
    pub fn byte_len(&self) -> usize {
        self.0.to_string().len()
    }
}

impl From<serde_json::Value> for Snapshot {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: Uuid,
    /// Monotonic append sequence; breaks timestamp ties.
    #[serde(default)]
    pub seq: u64,
    pub content: Snapshot,
    pub created_at: DateTime<Utc>,
    pub is_auto_save: bool,
    #[serde(default)]
    pub size: usize,
}

impl Version {
    pub(crate) fn new(seq: u64, content: Snapshot, is_auto_save: bool) -> Self {
        let size = content.byte_len();
        Self {
            id: Uuid::new_v4(),
            seq,
            content,
            created_at: Utc::now(),
            is_auto_save,
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub content: Snapshot,
    pub file_path: Option<PathBuf>,
    pub dirty: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_autosave_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(title: impl Into<String>, content: Snapshot) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content,
            file_path: None,
            dirty: false,
            created_at: now,
            updated_at: now,
            last_autosave_at: None,
        }
    }

    pub fn empty(title: impl Into<String>) -> Self {
        Self::new(title, Snapshot::skeleton())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// The flat structure written to the primary storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedDocument {
    pub id: Uuid,
    pub title: String,
    pub content: Snapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub versions: Vec<Version>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_auto_save_at: Option<DateTime<Utc>>,
}

impl PersistedDocument {
    pub fn from_parts(document: &Document, versions: Vec<Version>) -> Self {
        Self {
            id: document.id,
            title: document.title.clone(),
            content: document.content.clone(),
            file_path: document.file_path.clone(),
            versions,
            created_at: document.created_at,
            updated_at: document.updated_at,
            last_auto_save_at: document.last_autosave_at,
        }
    }

    /// Split into an in-memory document (clean) and its stored versions.
    /// `location` is where the bytes were actually read from and wins over
    /// whatever `filePath` was recorded when the file was written.
    pub fn into_parts(self, location: &Path) -> (Document, Vec<Version>) {
        let document = Document {
            id: self.id,
            title: self.title,
            content: self.content,
            file_path: Some(location.to_path_buf()),
            dirty: false,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_autosave_at: self.last_auto_save_at,
        };
        (document, self.versions)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Where to find a document: a storage path or a document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Path(PathBuf),
    Id(Uuid),
}

impl Locator {
    pub fn resolve(&self, documents_dir: &Path) -> PathBuf {
        match self {
            Locator::Path(path) => path.clone(),
            Locator::Id(id) => document_path(documents_dir, id),
        }
    }
}

impl FromStr for Locator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match Uuid::parse_str(s) {
            Ok(id) => Locator::Id(id),
            Err(_) => Locator::Path(PathBuf::from(s)),
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Path(path) => write!(f, "{}", path.display()),
            Locator::Id(id) => write!(f, "{}", id),
        }
    }
}

impl From<PathBuf> for Locator {
    fn from(path: PathBuf) -> Self {
        Locator::Path(path)
    }
}

impl From<Uuid> for Locator {
    fn from(id: Uuid) -> Self {
        Locator::Id(id)
    }
}

pub fn document_path(documents_dir: &Path, id: &Uuid) -> PathBuf {
    documents_dir.join(format!("{}.json", id))
}

/// A listing entry for persisted documents, read without activating them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub path: PathBuf,
    pub updated_at: DateTime<Utc>,
    pub version_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_starts_clean_with_skeleton() {
        let doc = Document::empty("Untitled");
        assert_eq!(doc.title, "Untitled");
        assert!(!doc.is_dirty());
        assert!(doc.file_path.is_none());
        let blocks = doc.content.as_value()["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["type"], "paragraph");
    }

    #[test]
    fn persisted_document_uses_camel_case_keys() {
        let doc = Document::new("Notes", Snapshot::new(json!({"text": "hi"})));
        let persisted = PersistedDocument::from_parts(&doc, vec![]);
        let value: serde_json::Value =
            serde_json::from_slice(&persisted.to_bytes().unwrap()).unwrap();

        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("filePath").is_none());
        assert!(value.get("lastAutoSaveAt").is_none());
        assert_eq!(value["content"], json!({"text": "hi"}));
    }

    #[test]
    fn into_parts_prefers_actual_location() {
        let mut doc = Document::new("Notes", Snapshot::skeleton());
        doc.file_path = Some(PathBuf::from("old/place.json"));
        let persisted = PersistedDocument::from_parts(&doc, vec![]);

        let (loaded, versions) = persisted.into_parts(Path::new("new/place.json"));
        assert_eq!(loaded.file_path, Some(PathBuf::from("new/place.json")));
        assert!(versions.is_empty());
        assert!(!loaded.dirty);
    }

    #[test]
    fn versions_without_seq_or_size_still_parse() {
        let raw = json!({
            "id": Uuid::new_v4(),
            "content": {"blocks": []},
            "createdAt": "2024-01-15T14:30:00Z",
            "isAutoSave": false
        });
        let version: Version = serde_json::from_value(raw).unwrap();
        assert_eq!(version.seq, 0);
        assert_eq!(version.size, 0);
    }

    #[test]
    fn locator_parses_ids_and_paths() {
        let id = Uuid::new_v4();
        assert_eq!(id.to_string().parse::<Locator>().unwrap(), Locator::Id(id));
        assert_eq!(
            "notes/today.json".parse::<Locator>().unwrap(),
            Locator::Path(PathBuf::from("notes/today.json"))
        );
        assert_eq!(
            Locator::Id(id).resolve(Path::new("documents")),
            PathBuf::from(format!("documents/{}.json", id))
        );
    }
}
