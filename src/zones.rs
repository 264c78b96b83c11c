//! Zone registry: three persisted named slots.
//!
//! The registry is a path handle, not a cache. Every read loads from the
//! durable file, so configuration written by a just-completed phase is
//! always observed by the next one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const ZONE_SLOTS: u8 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSlot {
    pub name: Option<String>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub zones: Vec<ZoneSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ZoneConfig {
    fn empty() -> Self {
        Self {
            zones: (0..ZONE_SLOTS).map(|_| ZoneSlot::default()).collect(),
            updated_at: None,
        }
    }

    /// Slot is 1-based.
    pub fn slot(&self, slot: u8) -> Option<&ZoneSlot> {
        if slot < 1 || slot > ZONE_SLOTS {
            return None;
        }
        self.zones.get(slot as usize - 1)
    }
}

#[derive(Debug, Clone)]
pub struct ActiveZone {
    pub slot: u8,
    pub name: String,
    pub configured_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ZoneValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone)]
pub struct ZoneRegistry {
    path: PathBuf,
}

impl ZoneRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load from the durable file, creating a default file when absent.
    /// A corrupt file degrades to the default configuration (logged).
    pub fn load(&self) -> ZoneConfig {
        if !self.path.exists() {
            let config = ZoneConfig::empty();
            if let Err(e) = self.save(&config) {
                warn!(path = %self.path.display(), error = %e, "could not create default zone config");
            }
            return config;
        }
        match std::fs::read_to_string(&self.path) {
            Ok(data) => match serde_json::from_str::<ZoneConfig>(&data) {
                Ok(mut config) => {
                    // Tolerate files written with fewer slots
                    while config.zones.len() < ZONE_SLOTS as usize {
                        config.zones.push(ZoneSlot::default());
                    }
                    config
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "corrupt zone config, using defaults");
                    ZoneConfig::empty()
                }
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable zone config, using defaults");
                ZoneConfig::empty()
            }
        }
    }

    pub fn save(&self, config: &ZoneConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut to_save = config.clone();
        to_save.updated_at = Some(Utc::now());
        let data = serde_json::to_string_pretty(&to_save)?;
        std::fs::write(&self.path, data)
            .map_err(|e| Error::Storage(format!("writing {}: {e}", self.path.display())))
    }

    /// Configure a slot. The name is uppercased; very short names and slots
    /// outside 1..=3 are rejected.
    pub fn set_zone(&self, slot: u8, name: &str) -> Result<()> {
        if slot < 1 || slot > ZONE_SLOTS {
            return Err(Error::Validation(format!(
                "zone slot must be between 1 and {ZONE_SLOTS}, got {slot}"
            )));
        }
        let name = name.trim().to_uppercase();
        if name.len() < 2 {
            return Err(Error::Validation("zone name too short".to_string()));
        }

        let mut config = self.load();
        config.zones[slot as usize - 1] = ZoneSlot {
            name: Some(name.clone()),
            active: true,
            configured_at: Some(Utc::now()),
        };
        self.save(&config)?;
        info!(slot, name = %name, "zone configured");
        Ok(())
    }

    pub fn get_zone(&self, slot: u8) -> Option<ZoneSlot> {
        self.load().slot(slot).cloned()
    }

    /// Clear every slot in one write.
    pub fn reset_all(&self) -> Result<()> {
        self.save(&ZoneConfig::empty())?;
        info!("all zone slots reset");
        Ok(())
    }

    pub fn list_active(&self) -> Vec<ActiveZone> {
        let config = self.load();
        (1..=ZONE_SLOTS)
            .filter_map(|slot| {
                let zone = config.slot(slot)?;
                match (&zone.name, zone.active) {
                    (Some(name), true) => Some(ActiveZone {
                        slot,
                        name: name.clone(),
                        configured_at: zone.configured_at,
                    }),
                    _ => None,
                }
            })
            .collect()
    }

    pub fn validate(&self) -> ZoneValidation {
        let config = self.load();
        let mut report = ZoneValidation::default();
        for slot in 1..=ZONE_SLOTS {
            let Some(zone) = config.slot(slot) else {
                report.errors.push(format!("zone {slot}: slot missing"));
                continue;
            };
            match &zone.name {
                None => report.warnings.push(format!("zone {slot}: not configured")),
                Some(name) if name.len() < 3 => report
                    .warnings
                    .push(format!("zone {slot}: name very short ({name})")),
                Some(_) => {}
            }
            if zone.active && zone.name.is_none() {
                report
                    .errors
                    .push(format!("zone {slot}: active but unnamed"));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> ZoneRegistry {
        ZoneRegistry::new(dir.path().join("zones.json"))
    }

    #[test]
    fn test_set_zone_uppercases_and_activates() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_zone(2, "oak").unwrap();

        let zone = reg.get_zone(2).unwrap();
        assert_eq!(zone.name.as_deref(), Some("OAK"));
        assert!(zone.active);
        assert!(zone.configured_at.is_some());
    }

    #[test]
    fn test_set_zone_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        assert!(matches!(reg.set_zone(0, "oak"), Err(Error::Validation(_))));
        assert!(matches!(reg.set_zone(4, "oak"), Err(Error::Validation(_))));
        assert!(matches!(reg.set_zone(1, " x "), Err(Error::Validation(_))));
    }

    #[test]
    fn test_reset_all_clears_every_slot() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_zone(1, "riverside").unwrap();
        reg.set_zone(3, "hillcrest").unwrap();
        reg.reset_all().unwrap();

        for slot in 1..=ZONE_SLOTS {
            let zone = reg.get_zone(slot).unwrap();
            assert_eq!(zone.name, None);
            assert!(!zone.active);
        }
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let config = reg.load();
        assert_eq!(config.zones.len(), ZONE_SLOTS as usize);
        assert!(reg.path().exists());
    }

    #[test]
    fn test_list_active_skips_unconfigured() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_zone(2, "oak").unwrap();

        let active = reg.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].slot, 2);
        assert_eq!(active[0].name, "OAK");
    }

    #[test]
    fn test_validate_reports_unconfigured_slots() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_zone(1, "riverside").unwrap();

        let report = reg.validate();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 2); // slots 2 and 3 unconfigured
    }

    #[test]
    fn test_changes_observed_by_fresh_reads() {
        // Two handles over the same file: writes through one are seen by the other
        let dir = TempDir::new().unwrap();
        let writer = registry(&dir);
        let reader = ZoneRegistry::new(dir.path().join("zones.json"));
        writer.set_zone(1, "riverside").unwrap();
        assert_eq!(reader.get_zone(1).unwrap().name.as_deref(), Some("RIVERSIDE"));
    }
}
