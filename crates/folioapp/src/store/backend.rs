use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

/// Receives the watched path every time the backend sees it change.
pub type ChangeSink = UnboundedSender<PathBuf>;

/// Keeps a watch registration alive. Dropping it stops the notifications.
pub struct WatchGuard {
    _inner: Box<dyn Send>,
}

impl WatchGuard {
    pub fn new<T: Send + 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// A file-like entry directly inside a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub path: PathBuf,
    pub name: String,
}

/// Abstract interface for raw storage I/O.
///
/// This trait handles the "how" of storage (filesystem vs in-process key-value
/// store), while the session, ledger and recovery manager handle the "what".
/// Paths are relative to the backend root; the filesystem backend also honours
/// absolute paths.
///
/// Implementations are blocking. Async callers go through [`super::io`], which
/// moves each call onto the blocking pool.
pub trait StorageBackend: Send + Sync {
    /// Read raw bytes.
    /// Returns Ok(None) if nothing is stored at `path`.
    /// Returns Err only on actual I/O errors (permissions, disk failure).
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Write bytes, creating parent directories as needed.
    /// MUST be atomic (e.g. write to tmp then rename) to avoid partial writes.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// List entries directly inside `dir`, sorted by name.
    /// A missing directory lists as empty.
    fn list(&self, dir: &Path) -> Result<Vec<StorageEntry>>;

    /// Remove the entry at `path`. Removing a missing entry is not an error.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Report every change to exactly `path` into `sink` until the guard drops.
    fn watch(&self, path: &Path, sink: ChangeSink) -> Result<WatchGuard>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String;
}
