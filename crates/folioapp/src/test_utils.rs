use crate::session::{DocumentSession, SessionConfig};
use crate::store::fs_backend::FsBackend;
use crate::store::SharedBackend;
use crate::sync::{SyncOp, SyncTransport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestEnv {
    // We keep _temp_dir to ensure the directory is not dropped until the test is done
    pub _temp_dir: TempDir,
    pub backend: SharedBackend,
    pub root: PathBuf,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let backend: SharedBackend = Arc::new(FsBackend::new(root.clone()));
        Self {
            _temp_dir: temp_dir,
            backend,
            root,
        }
    }

    /// A session on this directory. Must be called inside a tokio runtime.
    pub fn session(&self, config: SessionConfig) -> DocumentSession {
        DocumentSession::new(Arc::clone(&self.backend), config)
    }
}

/// Session settings with a short autosave interval for tests that wait on
/// the real timer.
pub fn fast_config(interval: Duration) -> SessionConfig {
    SessionConfig {
        autosave_interval: interval,
        ..Default::default()
    }
}

/// Records every executed operation and fails on demand.
#[derive(Default)]
pub struct ScriptedTransport {
    executed: Mutex<Vec<SyncOp>>,
    failures: Mutex<usize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls.
    pub fn fail_next(&self, n: usize) {
        *self.failures.lock() = n;
    }

    pub fn executed(&self) -> Vec<SyncOp> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl SyncTransport for ScriptedTransport {
    async fn execute(&self, op: &SyncOp) -> Result<(), TransportError> {
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Unreachable("scripted failure".to_string()));
            }
        }
        self.executed.lock().push(op.clone());
        Ok(())
    }
}
