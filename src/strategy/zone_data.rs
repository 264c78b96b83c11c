//! Zone-data strategy (codes 1..3): resident reports filed under the
//! active zone's name.
//!
//! Reloads the registry from disk before every record. The zone may have
//! been configured by the phase that ran moments earlier in the same run.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Outcome, Strategy};
use crate::capture::MessageRecord;
use crate::collab::{Extractor, RowStore, ZoneDataFields};
use crate::error::Result;
use crate::zones::ZoneRegistry;

pub struct ZoneDataStrategy {
    registry: ZoneRegistry,
    extractor: Arc<dyn Extractor>,
    rows: Arc<dyn RowStore>,
}

impl ZoneDataStrategy {
    pub fn new(
        registry: ZoneRegistry,
        extractor: Arc<dyn Extractor>,
        rows: Arc<dyn RowStore>,
    ) -> Self {
        Self {
            registry,
            extractor,
            rows,
        }
    }
}

/// Fixed 11-column layout: the seven extracted fields, then message date,
/// message time, contact and original text. Missing extracted fields are
/// empty strings.
fn zone_row(msg: &MessageRecord, fields: &ZoneDataFields) -> Vec<String> {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    vec![
        field(&fields.full_name),
        field(&fields.street),
        field(&fields.house_number),
        field(&fields.phone),
        field(&fields.date),
        field(&fields.notes),
        field(&fields.issue),
        msg.timestamp.format("%Y-%m-%d").to_string(),
        msg.timestamp.format("%H:%M:%S").to_string(),
        msg.contact.clone(),
        msg.full_text.clone(),
    ]
}

#[async_trait]
impl Strategy for ZoneDataStrategy {
    fn name(&self) -> &'static str {
        "zone-data"
    }

    async fn process(&self, msg: &MessageRecord) -> Result<Outcome> {
        let slot = msg.code;

        // Fresh read from durable storage, never a cached view
        let zone = self.registry.get_zone(slot);
        let zone_name = match zone {
            Some(z) if z.active => match z.name {
                Some(name) => name,
                None => {
                    warn!(slot, "zone active but unnamed, leaving record pending");
                    return Ok(Outcome::Skipped(format!("zone {slot} not configured")));
                }
            },
            _ => {
                warn!(slot, "zone not configured, leaving record pending");
                return Ok(Outcome::Skipped(format!("zone {slot} not configured")));
            }
        };

        let Some(fields) = self.extractor.extract_zone_data(&msg.content).await? else {
            return Ok(Outcome::Completed("no zone data detected".to_string()));
        };

        // Rows are keyed by zone *name*: renaming a slot files subsequent
        // rows under the new name, old rows stay where they were
        self.rows.append_row(&zone_name, zone_row(msg, &fields)).await?;
        info!(slot, zone = %zone_name, contact = %msg.contact, "zone data row stored");
        Ok(Outcome::Completed(format!("zone data stored for {zone_name}")))
    }
}
