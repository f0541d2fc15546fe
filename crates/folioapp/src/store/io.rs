//! Async entry points for backend I/O.
//!
//! Backends are plain blocking code; these wrappers run each call on tokio's
//! blocking pool so the session worker and the editor-facing futures never
//! stall a runtime thread on disk access.

use super::SharedBackend;
use crate::error::{FolioError, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::backend::StorageEntry;

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FolioError::Store(format!("storage task failed: {}", e)))?
}

pub async fn read(backend: &SharedBackend, path: PathBuf) -> Result<Option<Vec<u8>>> {
    let backend = Arc::clone(backend);
    blocking(move || backend.read(&path)).await
}

pub async fn write(backend: &SharedBackend, path: PathBuf, bytes: Vec<u8>) -> Result<()> {
    let backend = Arc::clone(backend);
    blocking(move || backend.write(&path, &bytes)).await
}

pub async fn list(backend: &SharedBackend, dir: PathBuf) -> Result<Vec<StorageEntry>> {
    let backend = Arc::clone(backend);
    blocking(move || backend.list(&dir)).await
}

pub async fn remove(backend: &SharedBackend, path: PathBuf) -> Result<()> {
    let backend = Arc::clone(backend);
    blocking(move || backend.remove(&path)).await
}
