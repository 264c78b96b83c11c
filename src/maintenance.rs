//! Destructive maintenance: the full system reset.
//!
//! Everything is backed up before it is destroyed. Capture stores already
//! snapshot their file on every write, so clearing them leaves a backup
//! behind; the zone configuration file is copied here explicitly.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::capture::{CaptureStore, MediaRecord, MessageRecord};
use crate::error::{Error, Result};
use crate::zones::ZoneRegistry;

#[derive(Debug, Default)]
pub struct ResetReport {
    pub messages_removed: usize,
    pub media_removed: usize,
    pub media_files_purged: usize,
    pub zone_backup: Option<PathBuf>,
}

/// Wipes captured messages, captured media, downloaded media files and the
/// zone configuration. The caller is responsible for confirmation; this
/// function assumes consent was already given.
pub fn full_reset(
    messages: &CaptureStore<MessageRecord>,
    media: &CaptureStore<MediaRecord>,
    registry: &ZoneRegistry,
    media_dir: &Path,
    backup_dir: &Path,
) -> Result<ResetReport> {
    let mut report = ResetReport::default();

    report.zone_backup = backup_zone_file(registry.path(), backup_dir)?;
    registry.reset_all()?;
    info!("zone configuration reset");

    // clear() snapshots the store file into the backup dir before truncating
    report.messages_removed = messages.clear()?;
    report.media_removed = media.clear()?;
    info!(
        messages = report.messages_removed,
        media = report.media_removed,
        "capture stores cleared"
    );

    report.media_files_purged = purge_dir(media_dir)?;
    if report.media_files_purged > 0 {
        info!(files = report.media_files_purged, dir = %media_dir.display(), "media files removed");
    }

    Ok(report)
}

fn backup_zone_file(path: &Path, backup_dir: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::create_dir_all(backup_dir)?;
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "zones.json".to_string());
    let dest = backup_dir.join(format!("{file_name}_backup_{stamp}"));
    fs::copy(path, &dest)
        .map_err(|e| Error::Storage(format!("could not back up {}: {e}", path.display())))?;
    Ok(Some(dest))
}

/// Removes regular files directly inside `dir`. Subdirectories are left
/// alone; the capture layer never nests media.
fn purge_dir(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %path.display(), error = %e, "could not remove media file"),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MediaKind;
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_full_reset_wipes_everything_with_backups() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        let media_dir = dir.path().join("media");
        fs::create_dir_all(&media_dir).unwrap();

        let messages: CaptureStore<MessageRecord> =
            CaptureStore::new(dir.path().join("messages.json"), backups.clone());
        let media: CaptureStore<MediaRecord> =
            CaptureStore::new(dir.path().join("media.json"), backups.clone());
        let registry = ZoneRegistry::new(dir.path().join("zones.json"));

        registry.set_zone(1, "riverside").unwrap();
        messages
            .append(MessageRecord::from_text("5 meeting", "Ana", Utc::now()))
            .unwrap();
        let photo = media_dir.join("photo.jpg");
        fs::write(&photo, b"bytes").unwrap();
        media
            .append(MediaRecord::from_caption(
                "1 photo",
                "Ana",
                Utc::now(),
                MediaKind::Image,
                &photo,
                5,
            ))
            .unwrap();

        let report = full_reset(&messages, &media, &registry, &media_dir, &backups).unwrap();

        assert_eq!(report.messages_removed, 1);
        assert_eq!(report.media_removed, 1);
        assert_eq!(report.media_files_purged, 1);
        assert!(report.zone_backup.as_ref().unwrap().exists());

        assert!(messages.read_all().is_empty());
        assert!(media.read_all().is_empty());
        assert!(registry.get_zone(1).map_or(true, |z| !z.active));
        assert!(!photo.exists());

        // The stores snapshotted themselves before truncating
        let backup_names: Vec<_> = fs::read_dir(&backups)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(backup_names.iter().any(|n| n.starts_with("messages.json_backup_")));
        assert!(backup_names.iter().any(|n| n.starts_with("media.json_backup_")));
    }

    #[test]
    fn test_reset_with_missing_inputs_is_harmless() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("backups");
        let messages: CaptureStore<MessageRecord> =
            CaptureStore::new(dir.path().join("messages.json"), backups.clone());
        let media: CaptureStore<MediaRecord> =
            CaptureStore::new(dir.path().join("media.json"), backups.clone());
        let registry = ZoneRegistry::new(dir.path().join("zones.json"));

        let report = full_reset(
            &messages,
            &media,
            &registry,
            &dir.path().join("nope"),
            &backups,
        )
        .unwrap();
        assert_eq!(report.messages_removed, 0);
        assert_eq!(report.media_files_purged, 0);
    }
}
