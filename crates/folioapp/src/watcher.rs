//! Change watching for the active document's backing location.
//!
//! The watcher only reports that something happened at the watched path. It
//! never reads the file or touches session state: the session worker receives
//! the path, reads the bytes and decides whether the change was its own write
//! or a foreign one.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::{ChangeSink, SharedBackend, WatchGuard};

/// At most one watch at a time; attaching elsewhere drops the previous one.
pub struct ChangeWatcher {
    backend: SharedBackend,
    sink: ChangeSink,
    current: Option<(PathBuf, WatchGuard)>,
}

impl ChangeWatcher {
    pub fn new(backend: SharedBackend, sink: ChangeSink) -> Self {
        Self {
            backend,
            sink,
            current: None,
        }
    }

    /// Watch `path`. A no-op if it is already the watched path.
    pub fn attach(&mut self, path: &Path) -> Result<()> {
        if self.watched() == Some(path) {
            return Ok(());
        }
        self.detach();
        let guard = self.backend.watch(path, self.sink.clone())?;
        debug!(path = %path.display(), "watching document location");
        self.current = Some((path.to_path_buf(), guard));
        Ok(())
    }

    /// Like [`attach`](Self::attach), but a failure only costs conflict
    /// detection, so it is logged instead of returned.
    pub fn attach_or_warn(&mut self, path: &Path) {
        if let Err(e) = self.attach(path) {
            warn!(path = %path.display(), error = %e, "could not watch document location");
        }
    }

    pub fn detach(&mut self) {
        if let Some((path, _guard)) = self.current.take() {
            debug!(path = %path.display(), "stopped watching document location");
        }
    }

    pub fn watched(&self) -> Option<&Path> {
        self.current.as_ref().map(|(path, _)| path.as_path())
    }
}
