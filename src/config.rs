//! Configuration file support for daz-command
//!
//! Config is loaded from `~/.daz/config.toml` (or `$DAZ_HOME/config.toml`)
//! Environment variables override config file settings.

use crate::storage::daz_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global config instance (loaded once on first access)
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::load)
}

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Language model used for summarization
    pub model: ModelConfig,

    /// Summary pipeline tuning
    pub summary: SummaryConfig,

    /// Where sessions live on disk
    pub storage: StorageConfig,
}

/// Language model endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier sent with each request
    pub name: String,
    /// OpenAI-compatible base URL (LM Studio by default)
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "openai/gpt-oss-20b".to_string(),
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: None,
            request_timeout_secs: 300,
        }
    }
}

/// Summary pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Run the background summarizer at all
    pub enabled: bool,
    /// Starting per-batch token ceiling
    pub initial_token_limit: usize,
    /// The ceiling never shrinks below this
    pub min_token_limit: usize,
    /// Percentage kept when shrinking the ceiling
    pub shrink_percent: usize,
    /// Attempts per batch when the model reports a capacity error
    pub max_retries: usize,
    /// Responses shorter than this are rejected
    pub min_response_chars: usize,
    /// Character cap for input/output detail blocks in the prompt
    pub detail_char_cap: usize,
    /// How long startup waits for the worker to come up
    pub init_timeout_secs: u64,
    /// How long closing a session waits for the queue to drain
    pub drain_timeout_secs: u64,
    /// Poll interval while waiting for the queue to drain
    pub drain_poll_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_token_limit: 30_000,
            min_token_limit: 1_000,
            shrink_percent: 90,
            max_retries: 3,
            min_response_chars: 256,
            detail_char_cap: 256,
            init_timeout_secs: 10,
            drain_timeout_secs: 30,
            drain_poll_ms: 500,
        }
    }
}

impl SummaryConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms.max(1))
    }
}

/// Session storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the per-session directories (default: ~/.daz/sessions)
    pub sessions_dir: Option<PathBuf>,
    /// history.json is trimmed to stay under this many characters
    pub history_max_chars: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: None,
            history_max_chars: 32 * 1024,
        }
    }
}

impl StorageConfig {
    pub fn resolved_sessions_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.sessions_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(daz_dir()?.join("sessions")),
        }
    }
}

impl Config {
    /// Path to the config file
    pub fn path() -> Option<PathBuf> {
        daz_dir().ok().map(|d| d.join("config.toml"))
    }

    /// Load config from file, with environment variable overrides
    pub fn load() -> Self {
        let mut config = Self::load_from_file().unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    /// Load config from file only (no env overrides)
    fn load_from_file() -> Option<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return None;
        }

        let content = std::fs::read_to_string(&path).ok()?;
        match toml::from_str::<Self>(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                crate::logging::error(&format!("Failed to parse config file: {}", e));
                None
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DAZ_MODEL") {
            self.model.name = v;
        }
        if let Ok(v) = std::env::var("DAZ_MODEL_BASE_URL") {
            self.model.base_url = v;
        }
        if let Ok(v) = std::env::var("DAZ_MODEL_API_KEY") {
            self.model.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("DAZ_SESSIONS_DIR") {
            self.storage.sessions_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DAZ_TOKEN_LIMIT") {
            if let Ok(limit) = v.trim().parse::<usize>() {
                self.summary.initial_token_limit = limit;
            }
        }
        if let Ok(v) = std::env::var("DAZ_SUMMARY_ENABLED") {
            let v = v.trim().to_lowercase();
            self.summary.enabled = !matches!(v.as_str(), "0" | "false" | "no" | "off");
        }
    }
}
