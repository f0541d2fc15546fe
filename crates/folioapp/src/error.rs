use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document changed on disk by another process: {}", path.display())]
    ConflictDetected { path: PathBuf },

    #[error("Recovery record {name} is unreadable: {reason}")]
    RecoveryCorrupt { name: String, reason: String },

    #[error("{failed} deferred operation(s) failed on replay, {pending} still pending: {message}")]
    QueueReplay {
        failed: usize,
        pending: usize,
        message: String,
    },

    #[error("Version not found: {0}")]
    VersionNotFound(Uuid),

    #[error("No active document")]
    NoActiveDocument,

    #[error("Document {0} has unsaved changes; save or discard it first")]
    UnsavedChanges(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl FolioError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FolioError::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl From<confique::Error> for FolioError {
    fn from(err: confique::Error) -> Self {
        FolioError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FolioError>;
