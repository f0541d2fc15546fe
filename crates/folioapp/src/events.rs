//! Notifications broadcast by a [`crate::session::DocumentSession`].
//!
//! Subscribers get every event sent after they subscribed. A subscriber that
//! falls too far behind sees `RecvError::Lagged` and carries on; the session
//! never blocks on slow listeners.

use std::path::PathBuf;
use uuid::Uuid;

pub const EVENT_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Created {
        id: Uuid,
    },
    Loaded {
        id: Uuid,
        path: PathBuf,
    },
    Dirty {
        id: Uuid,
        revision: u64,
    },
    Saved {
        id: Uuid,
        version: Uuid,
        path: PathBuf,
        auto: bool,
    },
    AutosaveFailed {
        id: Uuid,
        error: String,
    },
    /// The backing file changed and the change did not come from this session.
    ConflictDetected {
        id: Uuid,
        path: PathBuf,
    },
    RecoveryAvailable {
        count: usize,
    },
    Recovered {
        record: String,
        document: Option<Uuid>,
        kept: bool,
    },
    Deleted {
        id: Uuid,
        path: PathBuf,
    },
    Closed {
        id: Uuid,
    },
}

impl SessionEvent {
    /// The document this event is about, if any.
    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            SessionEvent::Created { id }
            | SessionEvent::Loaded { id, .. }
            | SessionEvent::Dirty { id, .. }
            | SessionEvent::Saved { id, .. }
            | SessionEvent::AutosaveFailed { id, .. }
            | SessionEvent::ConflictDetected { id, .. }
            | SessionEvent::Deleted { id, .. }
            | SessionEvent::Closed { id } => Some(*id),
            SessionEvent::Recovered { document, .. } => *document,
            SessionEvent::RecoveryAvailable { .. } => None,
        }
    }
}
