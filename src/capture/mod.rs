//! Durable capture store backed by a JSON-array file.
//!
//! Append-only in spirit: records are never deleted implicitly. Processed
//! records leave the live file only through `archive_processed`, which moves
//! them to a dated history file. Every write is preceded by a timestamped
//! backup copy of the previous file contents.

mod record;

use chrono::Utc;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

pub use record::{
    detect_code, CapturedEvent, MediaKind, MediaRecord, MessageRecord, StoredRecord,
    SCHEDULE_CODE, ZONE_CONFIG_CODES, ZONE_DATA_CODES,
};

/// Per-bucket counters in store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub processed: usize,
    pub pending: usize,
}

impl Counts {
    fn add(&mut self, processed: bool) {
        self.total += 1;
        if processed {
            self.processed += 1;
        } else {
            self.pending += 1;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total: usize,
    pub processed: usize,
    pub pending: usize,
    pub by_code: BTreeMap<u8, Counts>,
    pub by_contact: BTreeMap<String, Counts>,
}

#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub kept_pending: usize,
    pub archived: usize,
    pub history_path: Option<PathBuf>,
}

/// File-backed store of captured records, generic over the text and media
/// variants. The store is a path handle; every operation is a synchronous
/// read-modify-write of the backing file.
#[derive(Clone)]
pub struct CaptureStore<R> {
    path: PathBuf,
    backup_dir: PathBuf,
    _marker: PhantomData<R>,
}

impl<R: StoredRecord> CaptureStore<R> {
    pub fn new(path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full backing file. A missing or corrupt file yields an empty
    /// collection (logged), never an error: capture must not be blocked by a
    /// bad read.
    pub fn read_all(&self) -> Vec<R> {
        if !self.path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "corrupt store file, treating as empty");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable store file, treating as empty");
                Vec::new()
            }
        }
    }

    fn write_all(&self, records: &[R]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.backup_existing()?;
        let data = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, data)
            .map_err(|e| Error::Storage(format!("writing {}: {e}", self.path.display())))
    }

    /// Copy the current file into the backup directory before it is
    /// overwritten, so a corrupting write never loses the previous state.
    fn backup_existing(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.backup_dir)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "store.json".to_string());
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f");
        let backup_path = self.backup_dir.join(format!("{file_name}_backup_{stamp}"));
        std::fs::copy(&self.path, &backup_path)?;
        debug!(backup = %backup_path.display(), "store backup created");
        Ok(())
    }

    /// Persist a new record, assigning its id and capture timestamp.
    pub fn append(&self, mut record: R) -> Result<R> {
        let mut records = self.read_all();
        record.assign_identity(Uuid::new_v4().to_string(), Utc::now());
        records.push(record.clone());
        self.write_all(&records)?;
        Ok(record)
    }

    /// Unprocessed records matching the optional predicate, sorted ascending
    /// by source event timestamp so conversations replay in chronological
    /// order regardless of network arrival order.
    pub fn list_pending<F>(&self, filter: Option<F>, limit: Option<usize>) -> Vec<R>
    where
        F: Fn(&R) -> bool,
    {
        let mut pending: Vec<R> = self
            .read_all()
            .into_iter()
            .filter(|r| !r.processed())
            .filter(|r| filter.as_ref().map_or(true, |f| f(r)))
            .collect();
        pending.sort_by_key(|r| r.timestamp());
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        pending
    }

    /// Pending records whose code is in the given set.
    pub fn list_pending_by_codes(&self, codes: &[u8]) -> Vec<R> {
        self.list_pending(Some(|r: &R| codes.contains(&r.code())), None)
    }

    /// Idempotent: marking an already-processed record succeeds again.
    /// Returns `Ok(false)` when the id is unknown.
    pub fn mark_processed(&self, id: &str, result: Option<String>) -> Result<bool> {
        let mut records = self.read_all();
        let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
            return Ok(false);
        };
        record.mark_processed(Utc::now(), result);
        self.write_all(&records)?;
        Ok(true)
    }

    /// Manual reprocessing: clears the processed flag and timestamp. The
    /// code and content are immutable and stay untouched.
    pub fn mark_unprocessed(&self, id: &str) -> Result<bool> {
        let mut records = self.read_all();
        let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
            return Ok(false);
        };
        record.mark_unprocessed();
        self.write_all(&records)?;
        Ok(true)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.read_all();
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.write_all(&records)?;
        Ok(true)
    }

    /// Partition the store: pending records stay in the live file, processed
    /// ones move to a dated history file (appended if one already exists for
    /// today). Never loses data.
    pub fn archive_processed(&self) -> Result<ArchiveReport> {
        let records = self.read_all();
        let (processed, pending): (Vec<R>, Vec<R>) =
            records.into_iter().partition(|r| r.processed());

        if processed.is_empty() {
            return Ok(ArchiveReport {
                kept_pending: pending.len(),
                archived: 0,
                history_path: None,
            });
        }

        let history_path = self.history_path();
        let mut history: Vec<R> = if history_path.exists() {
            let data = std::fs::read_to_string(&history_path)?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Vec::new()
        };
        let archived = processed.len();
        history.extend(processed);

        let data = serde_json::to_string_pretty(&history)?;
        std::fs::write(&history_path, data)
            .map_err(|e| Error::Storage(format!("writing {}: {e}", history_path.display())))?;

        self.write_all(&pending)?;
        info!(
            archived,
            kept = pending.len(),
            history = %history_path.display(),
            "processed records archived"
        );

        Ok(ArchiveReport {
            kept_pending: pending.len(),
            archived,
            history_path: Some(history_path),
        })
    }

    fn history_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "store".to_string());
        let date = Utc::now().format("%Y-%m-%d");
        self.path
            .with_file_name(format!("{stem}_history_{date}.json"))
    }

    pub fn stats(&self) -> StoreStats {
        let records = self.read_all();
        let mut stats = StoreStats {
            total: records.len(),
            ..Default::default()
        };
        for record in &records {
            if record.processed() {
                stats.processed += 1;
            } else {
                stats.pending += 1;
            }
            stats
                .by_code
                .entry(record.code())
                .or_default()
                .add(record.processed());
            stats
                .by_contact
                .entry(record.contact().to_string())
                .or_default()
                .add(record.processed());
        }
        stats
    }

    /// Substring search across the serialized form of each record.
    pub fn search(&self, needle: &str) -> Vec<R> {
        let needle = needle.to_lowercase();
        self.read_all()
            .into_iter()
            .filter(|r| {
                serde_json::to_string(r)
                    .map(|s| s.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Replace the live file with an empty collection. Only the explicit
    /// reset path uses this; a backup of the previous contents is taken
    /// like any other write.
    pub fn clear(&self) -> Result<usize> {
        let count = self.read_all().len();
        self.write_all(&[])?;
        Ok(count)
    }
}
