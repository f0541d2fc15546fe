use super::backend::{ChangeSink, StorageBackend, StorageEntry, WatchGuard};
use crate::error::{FolioError, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths pass through untouched (`Path::join` replaces the base).
    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(|e| FolioError::persistence(path, e))?;
        }
        Ok(())
    }

    fn is_temp_name(name: &str) -> bool {
        name.starts_with('.') && name.ends_with(".tmp")
    }
}

impl StorageBackend for FsBackend {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path);
        match fs::read(&target) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FolioError::persistence(target, e)),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        self.ensure_dir(&parent)?;

        let stem = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entry");

        // Atomic Write
        let tmp_path = parent.join(format!(".{}-{}.tmp", stem, Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp_path, bytes) {
            let _ = fs::remove_file(&tmp_path);
            return Err(FolioError::persistence(target, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &target) {
            let _ = fs::remove_file(&tmp_path);
            return Err(FolioError::persistence(target, e));
        }

        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn list(&self, dir: &Path) -> Result<Vec<StorageEntry>> {
        let root = self.resolve(dir);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let read_dir = fs::read_dir(&root).map_err(|e| FolioError::persistence(&root, e))?;

        for entry in read_dir {
            let entry = entry.map_err(|e| FolioError::persistence(&root, e))?;
            let full = entry.path();
            if !full.is_file() {
                continue;
            }
            let Some(name) = full.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if Self::is_temp_name(name) {
                continue;
            }
            entries.push(StorageEntry {
                path: dir.join(name),
                name: name.to_string(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let target = self.resolve(path);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FolioError::persistence(target, e)),
        }
    }

    fn watch(&self, path: &Path, sink: ChangeSink) -> Result<WatchGuard> {
        let target = self.resolve(path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        self.ensure_dir(&parent)?;

        // Atomic writes replace the file, so watch the directory and filter by name.
        let file_name = target.file_name().map(|n| n.to_os_string());
        let reported = path.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    let hit = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == file_name.as_deref());
                    if hit {
                        let _ = sink.send(reported.clone());
                    }
                }
                Err(e) => tracing::warn!(error = %e, "file watch error"),
            }
        })
        .map_err(|e| FolioError::Store(format!("failed to start file watcher: {}", e)))?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| {
                FolioError::Store(format!("failed to watch {}: {}", parent.display(), e))
            })?;

        Ok(WatchGuard::new(watcher))
    }

    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }
}
