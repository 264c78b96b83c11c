//! External collaborator interfaces: structured extraction, row-store
//! appends and media uploads. The pipeline only ever talks to these traits;
//! concrete backends live in submodules.

mod groq;
mod local;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use crate::error::Result;

pub use groq::{ChatExtractor, ExtractorSettings};
pub use local::{CopyUploader, JsonlRowStore};

/// Sheet name for schedule rows. Zone-data rows use the zone *name* as the
/// sheet key instead (observed behavior of the original system: a
/// reconfigured slot files new rows under the new name).
pub const SCHEDULE_SHEET: &str = "schedule";

/// Placeholder for schedule fields the extractor could not determine.
pub const UNSPECIFIED: &str = "unspecified";

/// Fields extracted from a schedule/agenda message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScheduleFields {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub person: Option<String>,
}

/// Fields extracted from a zone-data (resident report) message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ZoneDataFields {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
}

/// LLM-backed structured extraction. `Ok(None)` means the text was examined
/// and contains no data of the requested kind; that is not an error.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_schedule(&self, text: &str) -> Result<Option<ScheduleFields>>;
    async fn extract_zone_data(&self, text: &str) -> Result<Option<ZoneDataFields>>;
}

/// Spreadsheet-like positional row storage. Sheet resolution (lookup or
/// create) is the implementation's concern.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn append_row(&self, sheet: &str, values: Vec<String>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub zone: String,
    pub caption: String,
    pub contact: String,
}

/// Cloud file upload. Folder resolution by logical name is delegated to the
/// implementation; callers only supply the name.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_file(&self, folder: &str, path: &Path, meta: &UploadMeta) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording doubles used by strategy and processor tests.

    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Extractor with pre-programmed responses, popped in order. When the
    /// queue is empty it answers `Ok(None)`.
    #[derive(Default)]
    pub struct MockExtractor {
        pub schedule_replies: Mutex<VecDeque<Result<Option<ScheduleFields>>>>,
        pub zone_replies: Mutex<VecDeque<Result<Option<ZoneDataFields>>>>,
        pub calls: AtomicUsize,
        /// Artificial latency per call, for re-entrancy tests.
        pub delay: Option<Duration>,
    }

    impl MockExtractor {
        pub fn with_schedule(replies: Vec<Result<Option<ScheduleFields>>>) -> Self {
            Self {
                schedule_replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        pub fn with_zone_data(replies: Vec<Result<Option<ZoneDataFields>>>) -> Self {
            Self {
                zone_replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl Extractor for MockExtractor {
        async fn extract_schedule(&self, _text: &str) -> Result<Option<ScheduleFields>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.schedule_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }

        async fn extract_zone_data(&self, _text: &str) -> Result<Option<ZoneDataFields>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            self.zone_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    /// RowStore remembering every appended row.
    #[derive(Default)]
    pub struct RecordingRows {
        pub rows: Mutex<Vec<(String, Vec<String>)>>,
        pub fail_next: Mutex<Option<Error>>,
    }

    impl RecordingRows {
        pub fn appended(&self) -> Vec<(String, Vec<String>)> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RowStore for RecordingRows {
        async fn append_row(&self, sheet: &str, values: Vec<String>) -> Result<()> {
            if let Some(err) = self.fail_next.lock().unwrap().take() {
                return Err(err);
            }
            self.rows
                .lock()
                .unwrap()
                .push((sheet.to_string(), values));
            Ok(())
        }
    }

    /// Uploader remembering every upload; can be told to fail.
    #[derive(Default)]
    pub struct RecordingUploader {
        pub uploads: Mutex<Vec<(String, std::path::PathBuf)>>,
        pub fail_next: Mutex<Option<Error>>,
    }

    impl RecordingUploader {
        pub fn upload_count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Uploader for RecordingUploader {
        async fn upload_file(
            &self,
            folder: &str,
            path: &Path,
            _meta: &UploadMeta,
        ) -> Result<String> {
            if let Some(err) = self.fail_next.lock().unwrap().take() {
                return Err(err);
            }
            self.uploads
                .lock()
                .unwrap()
                .push((folder.to_string(), path.to_path_buf()));
            Ok(format!("file-{}", self.uploads.lock().unwrap().len()))
        }
    }
}
