//! Clean command implementation

use anyhow::Result;
use std::path::Path;

use crate::capture::{CaptureStore, MediaRecord, MessageRecord};
use crate::maintenance;
use crate::zones::ZoneRegistry;

/// The literal argument required before anything is deleted.
pub const CONFIRMATION: &str = "CONFIRM";

pub fn run(
    confirmation: &str,
    messages: &CaptureStore<MessageRecord>,
    media: &CaptureStore<MediaRecord>,
    registry: &ZoneRegistry,
    media_dir: &Path,
    backup_dir: &Path,
) -> Result<()> {
    if confirmation != CONFIRMATION {
        println!("This wipes all captured messages, media and zone configuration.");
        println!("Backups are written to {} first.", backup_dir.display());
        println!("To proceed, run: recado clean {CONFIRMATION}");
        return Ok(());
    }

    let report = maintenance::full_reset(messages, media, registry, media_dir, backup_dir)?;
    println!("✅ System reset complete");
    println!("   messages removed: {}", report.messages_removed);
    println!("   media removed:    {}", report.media_removed);
    println!("   files purged:     {}", report.media_files_purged);
    if let Some(backup) = &report.zone_backup {
        println!("   zone backup:      {}", backup.display());
    }
    Ok(())
}
