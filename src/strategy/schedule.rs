//! Schedule strategy (code 5): extract meeting fields and append a 9-column
//! row to the schedule sheet.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{Outcome, Strategy};
use crate::capture::MessageRecord;
use crate::collab::{Extractor, RowStore, ScheduleFields, SCHEDULE_SHEET, UNSPECIFIED};
use crate::error::Result;

pub struct ScheduleStrategy {
    extractor: Arc<dyn Extractor>,
    rows: Arc<dyn RowStore>,
}

impl ScheduleStrategy {
    pub fn new(extractor: Arc<dyn Extractor>, rows: Arc<dyn RowStore>) -> Self {
        Self { extractor, rows }
    }
}

/// Fixed 9-column layout: extracted date, time, reason, person, status,
/// message date, message time, contact, original text. Missing extracted
/// fields get an explicit placeholder.
fn schedule_row(msg: &MessageRecord, fields: &ScheduleFields) -> Vec<String> {
    let field = |v: &Option<String>| v.clone().unwrap_or_else(|| UNSPECIFIED.to_string());
    vec![
        field(&fields.date),
        field(&fields.time),
        field(&fields.reason),
        field(&fields.person),
        "pending".to_string(),
        msg.timestamp.format("%Y-%m-%d").to_string(),
        msg.timestamp.format("%H:%M:%S").to_string(),
        msg.contact.clone(),
        msg.full_text.clone(),
    ]
}

#[async_trait]
impl Strategy for ScheduleStrategy {
    fn name(&self) -> &'static str {
        "schedule"
    }

    async fn process(&self, msg: &MessageRecord) -> Result<Outcome> {
        let Some(fields) = self.extractor.extract_schedule(&msg.content).await? else {
            // Examined and rejected by the extractor; nothing to store
            return Ok(Outcome::Completed("no schedule detected".to_string()));
        };

        self.rows
            .append_row(SCHEDULE_SHEET, schedule_row(msg, &fields))
            .await?;
        info!(contact = %msg.contact, "schedule row stored");
        Ok(Outcome::Completed("schedule extracted and stored".to_string()))
    }
}
