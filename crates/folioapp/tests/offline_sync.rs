mod common;

use common::{manual_config, text, RecordingTransport};
use folioapp::model::Locator;
use folioapp::session::{CloseAction, DocumentSession};
use folioapp::store::mem_backend::MemBackend;
use folioapp::store::SharedBackend;
use folioapp::sync::{SyncCoordinator, SyncOpKind, DEFAULT_MAX_ATTEMPTS};
use std::sync::Arc;

#[tokio::test]
async fn test_explicit_saves_queue_while_offline_and_replay_in_order() {
    let backend: SharedBackend = Arc::new(MemBackend::new());
    let transport = Arc::new(RecordingTransport::default());
    let sync = SyncCoordinator::open(
        Arc::clone(&backend),
        transport.clone(),
        DEFAULT_MAX_ATTEMPTS,
        false,
    )
    .await
    .unwrap();

    let mut session =
        DocumentSession::with_sync(Arc::clone(&backend), manual_config(), sync.clone());
    let doc = session.create_empty("Synced").unwrap();

    for n in 0..3 {
        session.mutate(text(&n.to_string())).unwrap();
        // Local saves succeed regardless of connectivity.
        session.save(true).await.unwrap();
    }
    // Autosaves stay local.
    session.mutate(text("auto")).unwrap();
    session.save(false).await.unwrap();

    assert_eq!(sync.pending_count(), 3);
    assert!(transport.executed.lock().unwrap().is_empty());

    let report = sync.set_online(true).await.unwrap().unwrap();
    assert!(report.is_clean());

    let executed = transport.executed.lock().unwrap().clone();
    assert_eq!(executed.len(), 3);
    for (n, op) in executed.iter().enumerate() {
        assert_eq!(op.kind, SyncOpKind::PushDocument);
        assert_eq!(op.document_id, Some(doc.id));
        assert_eq!(op.payload["content"], *text(&n.to_string()).as_value());
    }
    assert_eq!(sync.pending_count(), 0);
}

#[tokio::test]
async fn test_online_delete_is_pushed_immediately() {
    let backend: SharedBackend = Arc::new(MemBackend::new());
    let transport = Arc::new(RecordingTransport::default());
    let sync = SyncCoordinator::open(
        Arc::clone(&backend),
        transport.clone(),
        DEFAULT_MAX_ATTEMPTS,
        true,
    )
    .await
    .unwrap();

    let mut session = DocumentSession::with_sync(Arc::clone(&backend), manual_config(), sync);
    let doc = session.create_empty("Short lived").unwrap();
    session.mutate(text("bye")).unwrap();
    session.close(CloseAction::Save).await.unwrap();
    session.delete_document(&Locator::Id(doc.id)).await.unwrap();

    let kinds: Vec<SyncOpKind> = transport
        .executed
        .lock()
        .unwrap()
        .iter()
        .map(|op| op.kind.clone())
        .collect();
    assert_eq!(
        kinds,
        vec![SyncOpKind::PushDocument, SyncOpKind::DeleteDocument]
    );
}
