//! Ingest command implementation
//!
//! Reads a JSON array of pre-extracted transport events and appends them to
//! the capture stores. This is the seam to the messaging layer: whatever
//! listens to the group dumps events here.

use anyhow::{Context, Result};
use std::path::Path;

use crate::capture::{CaptureStore, CapturedEvent, MediaRecord, MessageRecord};

pub fn run(
    messages: &CaptureStore<MessageRecord>,
    media: &CaptureStore<MediaRecord>,
    path: &Path,
) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let events: Vec<CapturedEvent> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid event array", path.display()))?;

    if events.is_empty() {
        println!("No events in {}.", path.display());
        return Ok(());
    }

    let mut text_count = 0usize;
    let mut media_count = 0usize;
    let mut coded = 0usize;

    for event in events {
        match event {
            CapturedEvent::Text {
                text,
                contact,
                timestamp,
            } => {
                let record = messages.append(MessageRecord::from_text(&text, &contact, timestamp))?;
                if record.code != 0 {
                    coded += 1;
                }
                text_count += 1;
            }
            CapturedEvent::Media {
                caption,
                contact,
                timestamp,
                kind,
                file_path,
                file_size_bytes,
            } => {
                media.append(MediaRecord::from_caption(
                    &caption,
                    &contact,
                    timestamp,
                    kind,
                    &file_path,
                    file_size_bytes,
                ))?;
                media_count += 1;
            }
        }
    }

    println!(
        "✅ Ingested {text_count} messages ({coded} with codes) and {media_count} media records"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ingest_mixed_events() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        let messages: CaptureStore<MessageRecord> =
            CaptureStore::new(dir.path().join("messages.json"), backups.clone());
        let media: CaptureStore<MediaRecord> =
            CaptureStore::new(dir.path().join("media.json"), backups);

        let events = r#"[
            {"type": "text", "text": "5 meeting friday", "contact": "Ana",
             "timestamp": "2026-08-01T10:00:00Z"},
            {"type": "text", "text": "just chatter", "contact": "Luis",
             "timestamp": "2026-08-01T10:01:00Z"},
            {"type": "media", "caption": "1 front door", "contact": "Ana",
             "timestamp": "2026-08-01T10:02:00Z", "kind": "image",
             "file_path": "/tmp/a.jpg", "file_size_bytes": 4096}
        ]"#;
        let events_path = dir.path().join("events.json");
        std::fs::write(&events_path, events).unwrap();

        run(&messages, &media, &events_path).unwrap();

        let msgs = messages.read_all();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].code, 5);
        assert_eq!(msgs[1].code, 0);
        let med = media.read_all();
        assert_eq!(med.len(), 1);
        assert_eq!(med[0].code, 1);
        assert_eq!(med[0].file_name, "a.jpg");
    }

    #[test]
    fn test_ingest_rejects_malformed_file() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        let messages: CaptureStore<MessageRecord> =
            CaptureStore::new(dir.path().join("messages.json"), backups.clone());
        let media: CaptureStore<MediaRecord> =
            CaptureStore::new(dir.path().join("media.json"), backups);

        let events_path = dir.path().join("events.json");
        std::fs::write(&events_path, "{not json").unwrap();
        assert!(run(&messages, &media, &events_path).is_err());
    }
}
