//! Chat-completions extraction backend.
//!
//! Talks to an OpenAI-compatible endpoint (Groq by default) and asks the
//! model to answer with strict JSON. Calls are paced, time-limited and
//! wrapped in a bounded retry loop with incremental backoff.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Extractor, ScheduleFields, ZoneDataFields};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Minimum spacing between consecutive calls.
    pub min_call_spacing_ms: u64,
}

impl ExtractorSettings {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout_secs: 15,
            max_retries: 3,
            min_call_spacing_ms: 1000,
        }
    }
}

#[derive(Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ScheduleReply {
    #[serde(default)]
    is_schedule: bool,
    #[serde(flatten)]
    fields: ScheduleFields,
}

#[derive(Deserialize)]
struct ZoneDataReply {
    #[serde(default)]
    is_zone_data: bool,
    #[serde(flatten)]
    fields: ZoneDataFields,
}

pub struct ChatExtractor {
    settings: ExtractorSettings,
    client: reqwest::Client,
    last_call: Mutex<Option<Instant>>,
}

impl ChatExtractor {
    pub fn new(settings: ExtractorSettings) -> Result<Self> {
        if settings.api_key.is_empty() {
            return Err(Error::Auth(
                "extraction API key is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            settings,
            client,
            last_call: Mutex::new(None),
        })
    }

    /// Keep a minimum spacing between consecutive calls.
    async fn pace(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(at) = *last {
            let spacing = Duration::from_millis(self.settings.min_call_spacing_ms);
            let elapsed = at.elapsed();
            if elapsed < spacing {
                let wait = spacing - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "pacing extractor call");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn request_once(&self, prompt: &str) -> Result<String> {
        self.pace().await;

        let body = json!({
            "model": self.settings.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.1,
            "max_tokens": 1000,
            "top_p": 1,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.settings.base_url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("extraction request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(Error::RateLimited { retry_after_secs });
        }
        if status.as_u16() == 401 {
            return Err(Error::Auth("extraction API key rejected".to_string()));
        }
        if !status.is_success() {
            return Err(Error::Unavailable(format!("HTTP {status}")));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("malformed extractor reply: {e}")))?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Unavailable("extractor reply has no choices".to_string()))
    }

    /// Bounded retry loop with incremental backoff (2s, 4s, 6s). Auth
    /// failures are surfaced immediately; everything else gets its attempts
    /// and the last error is propagated.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.request_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_secs(2 * attempt as u64);
                    warn!(
                        attempt,
                        max = self.settings.max_retries,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "extractor call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Extractor for ChatExtractor {
    async fn extract_schedule(&self, text: &str) -> Result<Option<ScheduleFields>> {
        let prompt = format!(
            "Analyze the following group message and decide whether it describes \
             a meeting, event or appointment.\n\n\
             If it does NOT, answer: {{\"is_schedule\": false}}\n\n\
             If it DOES, answer with EXACTLY this shape:\n\
             {{\"is_schedule\": true, \"date\": \"value or null\", \"time\": \"value or null\", \
             \"reason\": \"value or null\", \"person\": \"value or null\"}}\n\n\
             Message: \"{text}\"\n\nAnswer ONLY with the JSON:"
        );
        let content = self.complete(&prompt).await?;
        let reply: ScheduleReply = parse_model_json(&content)?;
        if reply.is_schedule {
            debug!("schedule detected by extractor");
            Ok(Some(reply.fields))
        } else {
            Ok(None)
        }
    }

    async fn extract_zone_data(&self, text: &str) -> Result<Option<ZoneDataFields>> {
        let prompt = format!(
            "Analyze the following message and extract resident report data \
             (name, address, phone, reported issue).\n\n\
             If it does NOT contain resident data, answer: {{\"is_zone_data\": false}}\n\n\
             If it DOES, answer with EXACTLY this shape:\n\
             {{\"is_zone_data\": true, \"full_name\": \"value or null\", \"street\": \"value or null\", \
             \"house_number\": \"value or null\", \"phone\": \"value or null\", \
             \"date\": \"value or null\", \"notes\": \"value or null\", \"issue\": \"value or null\"}}\n\n\
             Message: \"{text}\"\n\nAnswer ONLY with the JSON:"
        );
        let content = self.complete(&prompt).await?;
        let reply: ZoneDataReply = parse_model_json(&content)?;
        if reply.is_zone_data {
            debug!("zone data detected by extractor");
            Ok(Some(reply.fields))
        } else {
            Ok(None)
        }
    }
}

/// Models wrap JSON in prose or code fences more often than not; take the
/// outermost braces and parse those.
fn parse_model_json<T: serde::de::DeserializeOwned>(content: &str) -> Result<T> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => {
            return Err(Error::Unavailable(format!(
                "extractor reply contains no JSON object: {content:.60}"
            )))
        }
    };
    serde_json::from_str(json)
        .map_err(|e| Error::Unavailable(format!("extractor reply not parseable: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_json_plain() {
        let reply: ScheduleReply =
            parse_model_json(r#"{"is_schedule": true, "date": "friday", "time": null}"#).unwrap();
        assert!(reply.is_schedule);
        assert_eq!(reply.fields.date.as_deref(), Some("friday"));
        assert_eq!(reply.fields.time, None);
    }

    #[test]
    fn test_parse_model_json_fenced() {
        let content = "Here you go:\n```json\n{\"is_zone_data\": true, \"full_name\": \"Jane Doe\"}\n```";
        let reply: ZoneDataReply = parse_model_json(content).unwrap();
        assert!(reply.is_zone_data);
        assert_eq!(reply.fields.full_name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_parse_model_json_negative_flag() {
        let reply: ScheduleReply = parse_model_json(r#"{"is_schedule": false}"#).unwrap();
        assert!(!reply.is_schedule);
    }

    #[test]
    fn test_parse_model_json_garbage() {
        assert!(parse_model_json::<ScheduleReply>("no json at all").is_err());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let settings = ExtractorSettings::new("https://example.invalid/v1", "m", "");
        assert!(matches!(ChatExtractor::new(settings), Err(Error::Auth(_))));
    }
}
