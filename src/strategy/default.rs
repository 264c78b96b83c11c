//! Fallback for records without a recognized code: no external action, the
//! record is simply marked processed as ignored.

use async_trait::async_trait;

use super::{Outcome, Strategy};
use crate::capture::MessageRecord;
use crate::error::Result;

pub struct DefaultStrategy;

#[async_trait]
impl Strategy for DefaultStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn process(&self, msg: &MessageRecord) -> Result<Outcome> {
        tracing::debug!(code = msg.code, contact = %msg.contact, "no valid code, ignoring");
        Ok(Outcome::Completed("ignored: no valid code".to_string()))
    }
}
