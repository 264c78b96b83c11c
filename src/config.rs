//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::collab::ExtractorSettings;
use crate::processor::Delays;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Paths to capture files and local artifact directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_messages_path")]
    pub messages_path: String,

    #[serde(default = "default_media_path")]
    pub media_path: String,

    #[serde(default = "default_zones_path")]
    pub zones_path: String,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

/// Pacing and batching for processing runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_processing_delay_ms")]
    pub processing_delay_ms: u64,

    #[serde(default = "default_ia_delay_ms")]
    pub ia_delay_ms: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// LLM extraction endpoint. The API key is never stored in the file; only
/// the name of the environment variable holding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_min_call_spacing_ms")]
    pub min_call_spacing_ms: u64,
}

/// Destinations for processed rows and uploaded media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_rows_dir")]
    pub rows_dir: String,

    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
}

// Default value functions
fn default_messages_path() -> String {
    "data/messages.json".to_string()
}

fn default_media_path() -> String {
    "data/media.json".to_string()
}

fn default_zones_path() -> String {
    "data/zones.json".to_string()
}

fn default_backup_dir() -> String {
    "data/backups".to_string()
}

fn default_media_dir() -> String {
    "data/media".to_string()
}

fn default_processing_delay_ms() -> u64 {
    3000
}

fn default_ia_delay_ms() -> u64 {
    2000
}

fn default_batch_size() -> usize {
    10
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_call_spacing_ms() -> u64 {
    1000
}

fn default_rows_dir() -> String {
    "data/rows".to_string()
}

fn default_uploads_dir() -> String {
    "data/uploads".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            messages_path: default_messages_path(),
            media_path: default_media_path(),
            zones_path: default_zones_path(),
            backup_dir: default_backup_dir(),
            media_dir: default_media_dir(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            processing_delay_ms: default_processing_delay_ms(),
            ia_delay_ms: default_ia_delay_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            min_call_spacing_ms: default_min_call_spacing_ms(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rows_dir: default_rows_dir(),
            uploads_dir: default_uploads_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            processing: ProcessingConfig::default(),
            extractor: ExtractorConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./recado.yaml (current directory)
    /// 3. ~/.config/recado/recado.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "recado.yaml".to_string(),
            shellexpand::tilde("~/.config/recado/recado.yaml").to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    pub fn messages_path(&self) -> PathBuf {
        expand(&self.storage.messages_path)
    }

    pub fn media_path(&self) -> PathBuf {
        expand(&self.storage.media_path)
    }

    pub fn zones_path(&self) -> PathBuf {
        expand(&self.storage.zones_path)
    }

    pub fn backup_dir(&self) -> PathBuf {
        expand(&self.storage.backup_dir)
    }

    pub fn media_dir(&self) -> PathBuf {
        expand(&self.storage.media_dir)
    }

    pub fn rows_dir(&self) -> PathBuf {
        expand(&self.output.rows_dir)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        expand(&self.output.uploads_dir)
    }

    pub fn delays(&self) -> Delays {
        Delays::from_millis(
            self.processing.processing_delay_ms,
            self.processing.ia_delay_ms,
        )
    }

    /// Extractor settings with the key resolved from the environment.
    pub fn extractor_settings(&self, api_key: String) -> ExtractorSettings {
        ExtractorSettings {
            base_url: self.extractor.base_url.clone(),
            model: self.extractor.model.clone(),
            api_key,
            timeout_secs: self.extractor.timeout_secs,
            max_retries: self.extractor.max_retries,
            min_call_spacing_ms: self.extractor.min_call_spacing_ms,
        }
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
