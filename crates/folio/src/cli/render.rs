//! Human-readable output. Everything printed to stdout goes through here.

use super::styles;
use chrono::{DateTime, Utc};
use folioapp::config::FolioConfig;
use folioapp::model::{Document, DocumentSummary, Snapshot, Version};
use folioapp::recovery::RecoveryRecord;
use serde_json::{json, Value};

/// Plain text becomes one paragraph block per line.
pub fn snapshot_from_text(text: &str) -> Snapshot {
    let blocks: Vec<Value> = text
        .trim_end_matches('\n')
        .split('\n')
        .map(|line| json!({ "type": "paragraph", "data": { "text": line } }))
        .collect();
    Snapshot::new(json!({ "blocks": blocks }))
}

/// Text of every block that carries some, one per line. Unknown shapes
/// fall back to the raw JSON.
pub fn text_from_snapshot(snapshot: &Snapshot) -> String {
    match snapshot.as_value().get("blocks").and_then(Value::as_array) {
        Some(blocks) => blocks
            .iter()
            .filter_map(|block| block.pointer("/data/text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        None => snapshot.as_value().to_string(),
    }
}

pub fn relative_time(at: DateTime<Utc>) -> String {
    let elapsed = (Utc::now() - at).to_std().unwrap_or_default();
    timeago::Formatter::new().convert(elapsed)
}

fn short_id(id: &impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

pub fn print_created(document: &Document) {
    println!(
        "{} {} {}",
        styles::success().apply_to("Created"),
        styles::title().apply_to(&document.title),
        styles::id().apply_to(document.id),
    );
}

pub fn print_saved(document: &Document, version: &Version) {
    let path = document
        .file_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!(
        "{} {} {} {}",
        styles::success().apply_to("Saved"),
        styles::title().apply_to(&document.title),
        styles::muted().apply_to(format!("version {}", short_id(&version.id))),
        styles::muted().apply_to(path),
    );
}

pub fn print_documents(documents: &[DocumentSummary]) {
    if documents.is_empty() {
        println!("{}", styles::muted().apply_to("No documents yet."));
        return;
    }
    for doc in documents {
        println!(
            "{}  {}  {}",
            styles::id().apply_to(doc.id),
            styles::title().apply_to(&doc.title),
            styles::muted().apply_to(format!(
                "{} version(s), updated {}",
                doc.version_count,
                relative_time(doc.updated_at)
            )),
        );
    }
}

pub fn print_document(document: &Document, versions: usize) {
    println!("{}", styles::title().apply_to(&document.title));
    println!(
        "{}",
        styles::muted().apply_to(format!(
            "{} | {} version(s) | updated {}",
            document.id,
            versions,
            relative_time(document.updated_at)
        ))
    );
    println!();
    println!("{}", text_from_snapshot(&document.content));
}

pub fn print_versions(versions: &[Version]) {
    for version in versions {
        let kind = if version.is_auto_save {
            styles::muted().apply_to("auto")
        } else {
            styles::tag().apply_to("save")
        };
        println!(
            "{}  {}  {}  {}",
            styles::id().apply_to(short_id(&version.id)),
            kind,
            styles::muted().apply_to(relative_time(version.created_at)),
            styles::muted().apply_to(format!("{} bytes", version.size)),
        );
    }
}

pub fn print_records(records: &[RecoveryRecord]) {
    if records.is_empty() {
        println!("{}", styles::muted().apply_to("Nothing to recover."));
        return;
    }
    println!(
        "{}",
        styles::warning().apply_to(format!("{} unsaved edit(s) found", records.len()))
    );
    for record in records {
        let title = record.title.as_deref().unwrap_or("Untitled");
        let original = record
            .original_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "never saved".to_string());
        println!(
            "{}  {}  {}",
            styles::id().apply_to(&record.name),
            styles::title().apply_to(title),
            styles::muted().apply_to(format!(
                "{} | {}",
                relative_time(record.timestamp),
                original
            )),
        );
    }
}

pub fn print_config(config: &FolioConfig, data_dir: &str) {
    let value = serde_json::to_value(config).unwrap_or(Value::Null);
    if let Value::Object(fields) = value {
        for (key, value) in fields {
            let shown = match (key.as_str(), value) {
                ("data_dir", Value::Null) => format!("\"{}\" (default)", data_dir),
                (_, value) => value.to_string(),
            };
            println!("{} = {}", styles::tag().apply_to(key), shown);
        }
    }
}

pub fn print_message(message: impl AsRef<str>) {
    println!("{}", message.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lines_become_paragraph_blocks() {
        let snapshot = snapshot_from_text("first\nsecond\n");
        let blocks = snapshot.as_value()["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1]["data"]["text"], "second");
        assert_eq!(text_from_snapshot(&snapshot), "first\nsecond");
    }

    #[test]
    fn skeleton_renders_as_empty_text() {
        assert_eq!(text_from_snapshot(&Snapshot::skeleton()), "");
    }

    #[test]
    fn unknown_shape_falls_back_to_json() {
        let snapshot = Snapshot::new(json!({ "cells": [1, 2] }));
        assert_eq!(text_from_snapshot(&snapshot), r#"{"cells":[1,2]}"#);
    }
}
