mod common;

use common::{drain_events, manual_config, text};
use folioapp::events::SessionEvent;
use folioapp::model::{Locator, PersistedDocument};
use folioapp::session::{CloseAction, DocumentSession};
use folioapp::store::fs_backend::FsBackend;
use folioapp::store::SharedBackend;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn setup() -> (TempDir, SharedBackend) {
    let root = TempDir::new().unwrap();
    let backend: SharedBackend = Arc::new(FsBackend::new(root.path().to_path_buf()));
    (root, backend)
}

#[tokio::test]
async fn test_saved_file_is_pretty_camel_case_json() {
    let (root, backend) = setup();
    let mut session = DocumentSession::new(backend, manual_config());
    let doc = session.create_empty("On disk").unwrap();
    session.mutate(text("persisted")).unwrap();
    session.save(true).await.unwrap();

    let path = root.path().join("documents").join(format!("{}.json", doc.id));
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains('\n'), "expected pretty-printed JSON");

    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["title"], "On disk");
    assert!(value.get("createdAt").is_some());
    assert_eq!(value["versions"].as_array().unwrap().len(), 1);
    assert_eq!(value["versions"][0]["isAutoSave"], false);

    let persisted = PersistedDocument::from_bytes(raw.as_bytes()).unwrap();
    assert_eq!(persisted.content, text("persisted"));
}

#[tokio::test]
async fn test_load_by_path_uses_actual_location() {
    let (root, backend) = setup();
    let mut session = DocumentSession::new(Arc::clone(&backend), manual_config());
    session.create_empty("Moved by hand").unwrap();
    session.mutate(text("content")).unwrap();
    session.save(true).await.unwrap();
    let saved = session.document().unwrap().file_path.unwrap();
    session.close(CloseAction::Save).await.unwrap();

    // Someone moved the file outside the engine.
    fs::create_dir_all(root.path().join("archive")).unwrap();
    fs::rename(root.path().join(&saved), root.path().join("archive/moved.json")).unwrap();

    let mut reopened = DocumentSession::new(backend, manual_config());
    let loaded = reopened
        .load(&"archive/moved.json".parse::<Locator>().unwrap())
        .await
        .unwrap();
    assert_eq!(
        loaded.file_path.as_deref(),
        Some(std::path::Path::new("archive/moved.json"))
    );
    assert_eq!(loaded.content, text("content"));
}

#[tokio::test]
async fn test_external_edit_on_disk_is_detected() {
    let (root, backend) = setup();
    let mut session = DocumentSession::new(backend, manual_config());
    let mut events = session.subscribe();
    session.create_empty("Shared file").unwrap();
    session.mutate(text("ours")).unwrap();
    session.save(true).await.unwrap();
    let path = root.path().join(session.document().unwrap().file_path.unwrap());

    // Give the watcher a moment to settle on our own write.
    tokio::time::sleep(Duration::from_millis(200)).await;
    session.flush().await;
    drain_events(&mut events);

    fs::write(&path, "{\"edited\": \"elsewhere\"}").unwrap();

    let detected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::ConflictDetected { .. }) => break,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await;
    assert!(detected.is_ok(), "conflict not reported");
    assert_eq!(session.document().unwrap().content, text("ours"));
}
