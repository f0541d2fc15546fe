//! # Storage Layer
//!
//! This module defines the storage abstraction for folio. The [`StorageBackend`]
//! trait lets the rest of the engine work against either the local filesystem
//! or an in-process key-value store without branching on the environment.
//!
//! ## One Backend Per Session
//!
//! The backend is chosen once, when the session is constructed
//! ([`open_backend`] reads [`BackendKind`] from the config), and shared as a
//! [`SharedBackend`] by every component that needs I/O.
//!
//! ## Namespaces
//!
//! All components share one backend but never each other's keys:
//!
//! ```text
//! <root>/
//! ├── documents/              # Primary document files ({id}.json unless saved elsewhere)
//! ├── recovery/               # {timestamp}_{basename}.recovery.json side-channel records
//! └── sync/queue.json         # Deferred sync operations
//! ```
//!
//! ## Atomicity
//!
//! `write` must never leave a half-written entry behind. [`fs_backend::FsBackend`]
//! writes to a hidden temp file in the same directory and renames it over the
//! target; [`mem_backend::MemBackend`] swaps the whole value under a lock.
//!
//! ## Implementations
//!
//! - [`fs_backend::FsBackend`]: Production filesystem storage, `notify`-based watching.
//! - [`mem_backend::MemBackend`]: Key-value store for browser-like hosts and tests.

use crate::config::{BackendKind, FolioConfig};
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub mod backend;
pub mod fs_backend;
pub mod io;
pub mod mem_backend;

pub use backend::{ChangeSink, StorageBackend, StorageEntry, WatchGuard};

pub type SharedBackend = Arc<dyn StorageBackend>;

/// Build the backend selected by the configuration.
pub fn open_backend(config: &FolioConfig) -> Result<SharedBackend> {
    let backend: SharedBackend = match config.backend {
        BackendKind::Filesystem => Arc::new(fs_backend::FsBackend::new(config.data_dir()?)),
        BackendKind::Memory => Arc::new(mem_backend::MemBackend::new()),
    };
    tracing::debug!(backend = %backend.describe(), "storage backend opened");
    Ok(backend)
}

/// Hex SHA-256 of stored bytes, used to tell our own writes from foreign ones.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        assert_eq!(content_digest(b"abc"), content_digest(b"abc"));
        assert_ne!(content_digest(b"abc"), content_digest(b"abd"));
        assert_eq!(content_digest(b"").len(), 64);
    }

    #[test]
    fn open_backend_honours_kind() {
        let config = FolioConfig {
            backend: BackendKind::Memory,
            ..Default::default()
        };
        let backend = open_backend(&config).unwrap();
        assert_eq!(backend.describe(), "memory");
    }
}
