//! Zone-configuration strategy (codes 11..13).
//!
//! The message content names the zone for slot `code - 10`. The registry
//! update is the real work; the separator row in the zone's sheet is
//! best-effort and never fails the record.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Outcome, Strategy};
use crate::capture::MessageRecord;
use crate::collab::RowStore;
use crate::error::Result;
use crate::zones::ZoneRegistry;

pub struct ZoneConfigStrategy {
    registry: ZoneRegistry,
    rows: Arc<dyn RowStore>,
}

impl ZoneConfigStrategy {
    pub fn new(registry: ZoneRegistry, rows: Arc<dyn RowStore>) -> Self {
        Self { registry, rows }
    }
}

#[async_trait]
impl Strategy for ZoneConfigStrategy {
    fn name(&self) -> &'static str {
        "zone-config"
    }

    async fn process(&self, msg: &MessageRecord) -> Result<Outcome> {
        let slot = msg.code - 10;
        let name = msg.content.trim().to_uppercase();

        // Validation (empty or too-short name, slot range) surfaces here
        self.registry.set_zone(slot, &name)?;
        info!(slot, zone = %name, "zone slot configured");

        // Separator row in the zone's sheet, dated with the message date.
        // Sheet-side decoration only; a failure here must not undo the
        // registry update.
        let separator = vec![
            format!("=== {name} ==="),
            msg.timestamp.format("%Y-%m-%d").to_string(),
        ];
        if let Err(e) = self.rows.append_row(&name, separator).await {
            warn!(zone = %name, error = %e, "could not write zone separator row, continuing");
        }

        Ok(Outcome::Completed(format!("zone {slot} configured: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::testing::RecordingRows;
    use crate::error::Error;
    use chrono::Utc;
    use tempfile::TempDir;

    fn strategy(dir: &TempDir, rows: Arc<RecordingRows>) -> (ZoneConfigStrategy, ZoneRegistry) {
        let registry = ZoneRegistry::new(dir.path().join("zones.json"));
        (ZoneConfigStrategy::new(registry.clone(), rows), registry)
    }

    #[tokio::test]
    async fn test_configures_slot_from_code() {
        let dir = TempDir::new().unwrap();
        let rows = Arc::new(RecordingRows::default());
        let (strategy, registry) = strategy(&dir, rows.clone());

        let msg = MessageRecord::from_text("12 oak park", "Ana", Utc::now());
        let outcome = strategy.process(&msg).await.unwrap();
        assert!(matches!(outcome, Outcome::Completed(_)));

        let zone = registry.get_zone(2).unwrap();
        assert_eq!(zone.name.as_deref(), Some("OAK PARK"));
        assert!(zone.active);

        let appended = rows.appended();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0].0, "OAK PARK");
    }

    #[tokio::test]
    async fn test_empty_name_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let rows = Arc::new(RecordingRows::default());
        let (strategy, registry) = strategy(&dir, rows);

        let msg = MessageRecord::from_text("11", "Ana", Utc::now());
        let err = strategy.process(&msg).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!registry.get_zone(1).unwrap().active);
    }

    #[tokio::test]
    async fn test_row_failure_does_not_fail_record() {
        let dir = TempDir::new().unwrap();
        let rows = Arc::new(RecordingRows::default());
        *rows.fail_next.lock().unwrap() = Some(Error::Unavailable("sheet down".into()));
        let (strategy, registry) = strategy(&dir, rows);

        let msg = MessageRecord::from_text("13 hillcrest", "Ana", Utc::now());
        let outcome = strategy.process(&msg).await.unwrap();
        assert!(matches!(outcome, Outcome::Completed(_)));
        assert_eq!(registry.get_zone(3).unwrap().name.as_deref(), Some("HILLCREST"));
    }
}
