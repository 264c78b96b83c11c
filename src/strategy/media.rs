//! Media strategy: upload captured files into a folder named after the
//! active zone and the current date.
//!
//! Media records carry their own record type and phase, so this strategy
//! sits outside the message dispatcher.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::Outcome;
use crate::capture::MediaRecord;
use crate::collab::{UploadMeta, Uploader};
use crate::error::Result;
use crate::zones::{ZoneRegistry, ZoneSlot};

pub struct MediaStrategy {
    registry: ZoneRegistry,
    uploader: Arc<dyn Uploader>,
}

impl MediaStrategy {
    pub fn new(registry: ZoneRegistry, uploader: Arc<dyn Uploader>) -> Self {
        Self { registry, uploader }
    }

    pub async fn process(&self, media: &MediaRecord) -> Result<Outcome> {
        let slot = media.code;

        // Fresh read: the zone may have been configured earlier in this run
        let zone_name = match self.registry.get_zone(slot) {
            Some(ZoneSlot {
                name: Some(name),
                active: true,
                ..
            }) => name,
            _ => {
                warn!(slot, file = %media.file_name, "zone not configured, media stays pending");
                return Ok(Outcome::Skipped(format!("zone {slot} not configured")));
            }
        };

        let folder = format!("{}_{}", zone_name, Utc::now().format("%Y-%m-%d"));
        let meta = UploadMeta {
            zone: zone_name.clone(),
            caption: media.content.clone(),
            contact: media.contact.clone(),
        };

        let file_id = self
            .uploader
            .upload_file(&folder, &media.file_path, &meta)
            .await?;
        info!(
            zone = %zone_name,
            kind = media.media_kind.as_str(),
            file = %media.file_name,
            file_id = %file_id,
            "media uploaded"
        );
        Ok(Outcome::Completed(format!("uploaded to {folder} ({file_id})")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MediaKind;
    use crate::collab::testing::RecordingUploader;
    use crate::error::Error;
    use std::path::Path;
    use tempfile::TempDir;

    fn media(code_caption: &str, path: &Path) -> MediaRecord {
        MediaRecord::from_caption(
            code_caption,
            "Luis",
            Utc::now(),
            MediaKind::Image,
            path,
            1024,
        )
    }

    #[tokio::test]
    async fn test_unconfigured_zone_skips_upload() {
        let dir = TempDir::new().unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let strategy = MediaStrategy::new(
            ZoneRegistry::new(dir.path().join("zones.json")),
            uploader.clone(),
        );

        let rec = media("3 corner photo", Path::new("/tmp/x.jpg"));
        let outcome = strategy.process(&rec).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert_eq!(uploader.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_folder_carries_zone_name_and_date() {
        let dir = TempDir::new().unwrap();
        let registry = ZoneRegistry::new(dir.path().join("zones.json"));
        registry.set_zone(1, "riverside").unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        let strategy = MediaStrategy::new(registry, uploader.clone());

        let rec = media("1 flooded corner", Path::new("/tmp/x.jpg"));
        let outcome = strategy.process(&rec).await.unwrap();
        assert!(matches!(outcome, Outcome::Completed(_)));

        let uploads = uploader.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 1);
        let expected = format!("RIVERSIDE_{}", Utc::now().format("%Y-%m-%d"));
        assert_eq!(uploads[0].0, expected);
    }

    #[tokio::test]
    async fn test_upload_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let registry = ZoneRegistry::new(dir.path().join("zones.json"));
        registry.set_zone(1, "riverside").unwrap();
        let uploader = Arc::new(RecordingUploader::default());
        *uploader.fail_next.lock().unwrap() = Some(Error::Unavailable("quota".into()));
        let strategy = MediaStrategy::new(registry, uploader);

        let rec = media("1 photo", Path::new("/tmp/x.jpg"));
        assert!(strategy.process(&rec).await.is_err());
    }
}
