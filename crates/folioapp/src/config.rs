//! # Configuration
//!
//! Folio configuration is managed by [`confique`], which handles layered loading
//! from TOML files, environment variables, and compiled defaults.
//!
//! ## Storage Hierarchy
//!
//! Configuration is resolved in priority order:
//! 1. **Environment variables**: `FOLIO_BACKEND`, `FOLIO_AUTOSAVE_INTERVAL_SECS`, etc.
//! 2. **Project Config**: `.folio/folio.toml` in the working directory.
//! 3. **Global Config**: OS-appropriate config directory (via `directories` crate).
//! 4. **Compiled Defaults**: Built-in fallbacks via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `backend` | `filesystem` | `filesystem` or `memory` |
//! | `data_dir` | platform data dir | Root of all stored data |
//! | `autosave_interval_secs` | `30` | Autosave tick period |
//! | `max_versions` | `10` | Version ledger cap per document |
//! | `recovery_retention` | `5` | Recovery records kept |
//! | `recovery_max_age_days` | `7` | Recovery records older than this are purged |
//! | `sync_max_attempts` | `3` | Replay attempts before a deferred op is parked as failed |

use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FolioError, Result};

pub const DOCUMENTS_DIR: &str = "documents";
pub const RECOVERY_DIR: &str = "recovery";
pub const QUEUE_PATH: &str = "sync/queue.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Filesystem,
    Memory,
}

/// Configuration for folio, stored in `folio.toml`.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FolioConfig {
    /// Storage backend: "filesystem" or "memory".
    #[config(default = "filesystem", env = "FOLIO_BACKEND")]
    pub backend: BackendKind,

    /// Root directory for documents, recovery records and the sync queue.
    /// When absent, the platform data directory is used.
    #[config(env = "FOLIO_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seconds between autosave ticks.
    #[config(default = 30, env = "FOLIO_AUTOSAVE_INTERVAL_SECS")]
    pub autosave_interval_secs: u64,

    /// Maximum number of versions kept per document.
    #[config(default = 10, env = "FOLIO_MAX_VERSIONS")]
    pub max_versions: usize,

    /// Maximum number of recovery records kept.
    #[config(default = 5, env = "FOLIO_RECOVERY_RETENTION")]
    pub recovery_retention: usize,

    /// Recovery records older than this many days are purged.
    #[config(default = 7, env = "FOLIO_RECOVERY_MAX_AGE_DAYS")]
    pub recovery_max_age_days: u64,

    /// Replay attempts before a deferred sync operation is parked as failed.
    #[config(default = 3, env = "FOLIO_SYNC_MAX_ATTEMPTS")]
    pub sync_max_attempts: u32,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Filesystem,
            data_dir: None,
            autosave_interval_secs: 30,
            max_versions: 10,
            recovery_retention: 5,
            recovery_max_age_days: 7,
            sync_max_attempts: 3,
        }
    }
}

impl FolioConfig {
    /// Load the layered configuration. `project_dir` is where `.folio/folio.toml`
    /// is looked up; missing files are skipped.
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = FolioConfig::builder().env();
        if let Some(dir) = project_dir {
            builder = builder.file(project_config_path(dir));
        }
        if let Some(global) = global_config_path() {
            builder = builder.file(global);
        }
        Ok(builder.load()?)
    }

    /// A commented `folio.toml` listing every setting and its default.
    pub fn template() -> String {
        confique::toml::template::<FolioConfig>(confique::toml::FormatOptions::default())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("", "", "folio")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| FolioError::Config("could not determine a data directory".to_string()))
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    pub fn recovery_max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.recovery_max_age_days as i64)
    }
}

pub fn project_config_path(dir: &Path) -> PathBuf {
    dir.join(".folio").join("folio.toml")
}

pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "folio").map(|dirs| dirs.config_dir().join("folio.toml"))
}
