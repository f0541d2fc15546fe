use super::backend::{ChangeSink, StorageBackend, StorageEntry, WatchGuard};
use crate::error::{FolioError, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Default)]
struct MemState {
    entries: BTreeMap<PathBuf, Vec<u8>>,
    subscribers: HashMap<PathBuf, Vec<(u64, ChangeSink)>>,
    next_subscriber: u64,
    simulate_write_error: bool,
    write_delay: Option<Duration>,
}

/// In-process key-value backend.
///
/// Plays the role of browser-local storage: flat keys, whole-value writes, no
/// real directories. Clones share the same store, so a clone can act as a
/// second writer in tests. Also backs every unit test that doesn't need a disk.
#[derive(Clone, Default)]
pub struct MemBackend {
    state: Arc<Mutex<MemState>>,
}

struct Subscription {
    state: Weak<Mutex<MemState>>,
    path: PathBuf,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock();
            if let Some(subs) = state.subscribers.get_mut(&self.path) {
                subs.retain(|(id, _)| *id != self.id);
                if subs.is_empty() {
                    state.subscribers.remove(&self.path);
                }
            }
        }
    }
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.state.lock().simulate_write_error = simulate;
    }

    /// Make every write block for `delay` before landing, to emulate slow I/O.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.state.lock().write_delay = delay;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(state: &MemState, path: &Path) {
        if let Some(subs) = state.subscribers.get(path) {
            for (_, sink) in subs {
                let _ = sink.send(path.to_path_buf());
            }
        }
    }
}

impl StorageBackend for MemBackend {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let state = self.state.lock();
        Ok(state.entries.get(path).cloned())
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let delay = {
            let state = self.state.lock();
            if state.simulate_write_error {
                return Err(FolioError::persistence(
                    path,
                    io::Error::new(io::ErrorKind::Other, "Simulated write error"),
                ));
            }
            state.write_delay
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        state.entries.insert(path.to_path_buf(), bytes.to_vec());
        Self::notify(&state, path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state.lock().entries.contains_key(path)
    }

    fn list(&self, dir: &Path) -> Result<Vec<StorageEntry>> {
        let state = self.state.lock();
        Ok(state
            .entries
            .iter()
            .filter(|(path, _)| path.parent() == Some(dir))
            .filter_map(|(path, _)| {
                let name = path.file_name()?.to_str()?.to_string();
                Some(StorageEntry {
                    path: path.clone(),
                    name,
                })
            })
            .collect())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        if state.entries.remove(path).is_some() {
            Self::notify(&state, path);
        }
        Ok(())
    }

    fn watch(&self, path: &Path, sink: ChangeSink) -> Result<WatchGuard> {
        let mut state = self.state.lock();
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state
            .subscribers
            .entry(path.to_path_buf())
            .or_default()
            .push((id, sink));

        Ok(WatchGuard::new(Subscription {
            state: Arc::downgrade(&self.state),
            path: path.to_path_buf(),
            id,
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
