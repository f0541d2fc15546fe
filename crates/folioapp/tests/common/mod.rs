#![allow(dead_code)]

use async_trait::async_trait;
use folioapp::events::SessionEvent;
use folioapp::session::SessionConfig;
use folioapp::sync::{SyncOp, SyncTransport, TransportError};
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

use folioapp::model::Snapshot;

/// Autosave never fires on its own; tests drive it with `autosave_now`.
pub fn manual_config() -> SessionConfig {
    SessionConfig {
        autosave_interval: Duration::from_secs(3600),
        ..Default::default()
    }
}

pub fn text(s: &str) -> Snapshot {
    Snapshot::new(json!({
        "blocks": [ { "type": "paragraph", "data": { "text": s } } ]
    }))
}

pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[derive(Default)]
pub struct RecordingTransport {
    pub executed: Mutex<Vec<SyncOp>>,
}

#[async_trait]
impl SyncTransport for RecordingTransport {
    async fn execute(&self, op: &SyncOp) -> Result<(), TransportError> {
        self.executed.lock().unwrap().push(op.clone());
        Ok(())
    }
}
