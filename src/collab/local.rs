//! Filesystem-backed collaborator implementations.
//!
//! These keep the binary usable without any cloud account: rows land in
//! JSONL files (one file per sheet) and uploads are copies into a folder
//! tree, with a JSON sidecar holding the upload metadata.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{RowStore, UploadMeta, Uploader};
use crate::error::{Error, Result};

/// Strip characters that are unsafe in file and folder names.
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    cleaned.trim().chars().take(100).collect()
}

pub struct JsonlRowStore {
    dir: PathBuf,
}

impl JsonlRowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", sanitize_component(sheet)))
    }
}

#[async_trait]
impl RowStore for JsonlRowStore {
    async fn append_row(&self, sheet: &str, values: Vec<String>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.sheet_path(sheet);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("opening {}: {e}", path.display())))?;
        let line = serde_json::to_string(&values)?;
        writeln!(file, "{line}")
            .map_err(|e| Error::Storage(format!("appending to {}: {e}", path.display())))?;
        Ok(())
    }
}

pub struct CopyUploader {
    dir: PathBuf,
}

impl CopyUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Uploader for CopyUploader {
    async fn upload_file(&self, folder: &str, path: &Path, meta: &UploadMeta) -> Result<String> {
        if !path.exists() {
            return Err(Error::Validation(format!(
                "media file not found: {}",
                path.display()
            )));
        }
        let dest_dir = self.dir.join(sanitize_component(folder));
        std::fs::create_dir_all(&dest_dir)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Validation(format!("bad media path: {}", path.display())))?;
        let dest = dest_dir.join(&file_name);
        std::fs::copy(path, &dest)
            .map_err(|e| Error::Storage(format!("copying to {}: {e}", dest.display())))?;

        let sidecar = dest_dir.join(format!("{file_name}.meta.json"));
        let meta_json = serde_json::json!({
            "zone": meta.zone,
            "caption": meta.caption,
            "contact": meta.contact,
        });
        std::fs::write(&sidecar, serde_json::to_string_pretty(&meta_json)?)
            .map_err(|e| Error::Storage(format!("writing {}: {e}", sidecar.display())))?;

        let file_id = format!("{}/{}", sanitize_component(folder), file_name);
        info!(file_id = %file_id, "media stored");
        Ok(file_id)
    }
}
