//! Captured record types and code detection.
//!
//! A record's `code` selects its processing strategy:
//! - 11..13: zone configuration (slot = code - 10)
//! - 5: schedule
//! - 1..3: zone data
//! - 0: unclassified (anything without a recognized leading token)

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ZONE_DATA_CODES: [u8; 3] = [1, 2, 3];
pub const SCHEDULE_CODE: u8 = 5;
pub const ZONE_CONFIG_CODES: [u8; 3] = [11, 12, 13];

/// Split the leading code token off a message. Returns the code plus the
/// remaining content with the token and its separator stripped. Unrecognized
/// leading tokens yield code 0 and the text unchanged.
pub fn detect_code(text: &str) -> (u8, String) {
    let trimmed = text.trim();
    let token = trimmed.split_whitespace().next().unwrap_or("");

    let code = match token {
        "11" => 11,
        "12" => 12,
        "13" => 13,
        "5" => 5,
        "1" => 1,
        "2" => 2,
        "3" => 3,
        _ => return (0, text.to_string()),
    };

    let content = trimmed[token.len()..].trim().to_string();
    (code, content)
}

/// Behavior every durable record shares, so `CaptureStore` can stay generic
/// over the text and media variants.
pub trait StoredRecord: Clone + Serialize + DeserializeOwned {
    fn id(&self) -> &str;
    fn assign_identity(&mut self, id: String, captured_at: DateTime<Utc>);
    /// Time the source event occurred, not the capture time.
    fn timestamp(&self) -> DateTime<Utc>;
    fn code(&self) -> u8;
    fn contact(&self) -> &str;
    fn processed(&self) -> bool;
    fn mark_processed(&mut self, at: DateTime<Utc>, result: Option<String>);
    fn mark_unprocessed(&mut self);
}

/// A captured text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    /// Source event time (sender's clock), used for replay ordering.
    pub timestamp: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
    pub code: u8,
    /// Text with the leading code token stripped.
    pub content: String,
    pub full_text: String,
    pub contact: String,
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl MessageRecord {
    pub fn from_text(text: &str, contact: &str, timestamp: DateTime<Utc>) -> Self {
        let (code, content) = detect_code(text);
        Self {
            id: String::new(),
            timestamp,
            captured_at: Utc::now(),
            code,
            content,
            full_text: text.to_string(),
            contact: contact.to_string(),
            processed: false,
            processed_at: None,
            result: None,
        }
    }
}

impl StoredRecord for MessageRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn assign_identity(&mut self, id: String, captured_at: DateTime<Utc>) {
        self.id = id;
        self.captured_at = captured_at;
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn code(&self) -> u8 {
        self.code
    }

    fn contact(&self) -> &str {
        &self.contact
    }

    fn processed(&self) -> bool {
        self.processed
    }

    fn mark_processed(&mut self, at: DateTime<Utc>, result: Option<String>) {
        self.processed = true;
        self.processed_at = Some(at);
        if result.is_some() {
            self.result = result;
        }
    }

    fn mark_unprocessed(&mut self) {
        self.processed = false;
        self.processed_at = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Sticker,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Sticker => "sticker",
        }
    }
}

/// A captured media item. `content` holds the raw caption; the code is
/// derived from the caption's leading token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub captured_at: DateTime<Utc>,
    pub code: u8,
    pub content: String,
    pub contact: String,
    pub media_kind: MediaKind,
    pub file_name: String,
    pub file_path: PathBuf,
    pub file_extension: String,
    pub file_size_bytes: u64,
    pub uploaded: bool,
    pub processed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl MediaRecord {
    pub fn from_caption(
        caption: &str,
        contact: &str,
        timestamp: DateTime<Utc>,
        kind: MediaKind,
        file_path: &Path,
        file_size_bytes: u64,
    ) -> Self {
        let (code, _) = detect_code(caption);
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_extension = file_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            id: String::new(),
            timestamp,
            captured_at: Utc::now(),
            code,
            content: caption.to_string(),
            contact: contact.to_string(),
            media_kind: kind,
            file_name,
            file_path: file_path.to_path_buf(),
            file_extension,
            file_size_bytes,
            uploaded: false,
            processed: false,
            processed_at: None,
            result: None,
        }
    }
}

impl StoredRecord for MediaRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn assign_identity(&mut self, id: String, captured_at: DateTime<Utc>) {
        self.id = id;
        self.captured_at = captured_at;
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn code(&self) -> u8 {
        self.code
    }

    fn contact(&self) -> &str {
        &self.contact
    }

    fn processed(&self) -> bool {
        self.processed
    }

    fn mark_processed(&mut self, at: DateTime<Utc>, result: Option<String>) {
        self.processed = true;
        self.processed_at = Some(at);
        self.uploaded = true;
        if result.is_some() {
            self.result = result;
        }
    }

    fn mark_unprocessed(&mut self) {
        self.processed = false;
        self.processed_at = None;
    }
}

/// Pre-extracted transport event, as consumed by the `ingest` command.
/// The messaging layer itself (connection, auth, raw payloads) lives
/// outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapturedEvent {
    Text {
        text: String,
        contact: String,
        timestamp: DateTime<Utc>,
    },
    Media {
        caption: String,
        contact: String,
        timestamp: DateTime<Utc>,
        kind: MediaKind,
        file_path: PathBuf,
        file_size_bytes: u64,
    },
}
