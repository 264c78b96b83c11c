//! Processing strategies and the code-to-strategy dispatcher.
//!
//! A strategy receives one captured record and drives the collaborators for
//! it. Failures never partially mutate durable state: the triggering record
//! is marked processed only by the processor, and only after the strategy
//! returned `Outcome::Completed`.

mod default;
mod media;
mod schedule;
mod zone_config;
mod zone_data;

use async_trait::async_trait;
use std::sync::Arc;

use crate::capture::MessageRecord;
use crate::collab::{Extractor, RowStore, Uploader};
use crate::error::Result;
use crate::zones::ZoneRegistry;

pub use default::DefaultStrategy;
pub use media::MediaStrategy;
pub use schedule::ScheduleStrategy;
pub use zone_config::ZoneConfigStrategy;
pub use zone_data::ZoneDataStrategy;

/// What a strategy decided about one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The record is done; mark it processed with this result summary.
    Completed(String),
    /// The record cannot be handled yet (e.g. its zone is not configured);
    /// leave it pending for a later run.
    Skipped(String),
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn process(&self, msg: &MessageRecord) -> Result<Outcome>;
}

/// Maps a record's code to its strategy. Unknown codes (including 0) fall
/// through to the default strategy; dispatch never fails.
pub struct Dispatcher {
    zone_config: ZoneConfigStrategy,
    schedule: ScheduleStrategy,
    zone_data: ZoneDataStrategy,
    default: DefaultStrategy,
}

impl Dispatcher {
    pub fn new(
        registry: ZoneRegistry,
        extractor: Arc<dyn Extractor>,
        rows: Arc<dyn RowStore>,
    ) -> Self {
        Self {
            zone_config: ZoneConfigStrategy::new(registry.clone(), rows.clone()),
            schedule: ScheduleStrategy::new(extractor.clone(), rows.clone()),
            zone_data: ZoneDataStrategy::new(registry, extractor, rows),
            default: DefaultStrategy,
        }
    }

    pub fn dispatch(&self, code: u8) -> &dyn Strategy {
        match code {
            11..=13 => &self.zone_config,
            5 => &self.schedule,
            1..=3 => &self.zone_data,
            _ => &self.default,
        }
    }
}

/// Builds the media strategy alongside the dispatcher; media records have
/// their own phase and record type, so they sit outside the code map.
pub fn media_strategy(registry: ZoneRegistry, uploader: Arc<dyn Uploader>) -> MediaStrategy {
    MediaStrategy::new(registry, uploader)
}
