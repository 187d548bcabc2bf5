use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ProspectError, Result};

/// Top-level configuration for the prospect service.
///
/// Loaded from `~/.prospect/config.toml` by default. Every section falls back
/// to its defaults when absent, so an empty file is a valid configuration.
/// API keys never live here; each provider section names the environment
/// variable that holds its key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProspectConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl ProspectConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ProspectConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    /// or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the configuration as pretty TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !["openai", "mock"].contains(&self.llm.provider.as_str()) {
            return Err(ProspectError::Config(format!(
                "Unknown llm.provider '{}'. Must be one of: openai, mock",
                self.llm.provider
            )));
        }
        if !["elevenlabs", "google", "mock", "none"].contains(&self.voice.provider.as_str()) {
            return Err(ProspectError::Config(format!(
                "Unknown voice.provider '{}'. Must be one of: elevenlabs, google, mock, none",
                self.voice.provider
            )));
        }
        if self.session.idle_timeout_secs == 0 {
            return Err(ProspectError::Config(
                "session.idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.session.cleanup_interval_secs == 0 {
            return Err(ProspectError::Config(
                "session.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.session.persist_policy == PersistPolicy::EveryNTurns
            && self.session.flush_every_turns == 0
        {
            return Err(ProspectError::Config(
                "session.flush_every_turns must be greater than zero".to_string(),
            ));
        }
        if self.prompt.max_reply_chars == 0 {
            return Err(ProspectError::Config(
                "prompt.max_reply_chars must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server and process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the SQLite state database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
            data_dir: "~/.prospect/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Chat-completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "openai" (any OpenAI-compatible endpoint) or "mock".
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// Extra attempts when a reply fails the linter.
    pub max_reply_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.8,
            max_tokens: 150,
            request_timeout_secs: 30,
            max_reply_retries: 1,
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    /// "elevenlabs", "google", "mock", or "none".
    pub provider: String,
    pub api_key_env: String,
    /// ElevenLabs voice id.
    pub voice_id: String,
    /// ElevenLabs model id.
    pub model_id: String,
    /// Google voice name. Empty lets Google pick a voice for `language_code`.
    pub google_voice: String,
    /// Google language code.
    pub language_code: String,
    pub request_timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "elevenlabs".to_string(),
            api_key_env: "ELEVENLABS_API_KEY".to_string(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_turbo_v2".to_string(),
            google_voice: String::new(),
            language_code: "en-US".to_string(),
            request_timeout_secs: 20,
        }
    }
}

/// When conversation records are written to the durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistPolicy {
    /// Every turn is written before the turn completes.
    #[default]
    WriteThrough,
    /// Written every `flush_every_turns` turns and on eviction.
    EveryNTurns,
}

/// Conversation state lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a call is evicted from memory.
    pub idle_timeout_secs: u64,
    /// Period of the background sweep.
    pub cleanup_interval_secs: u64,
    pub persist_policy: PersistPolicy,
    pub flush_every_turns: u32,
    /// Durable records untouched for longer than this are purged.
    pub retention_hours: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60 * 60,
            cleanup_interval_secs: 30 * 60,
            persist_policy: PersistPolicy::WriteThrough,
            flush_every_turns: 5,
            retention_hours: 24 * 7,
        }
    }
}

/// Prompt compiler and reply linter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Trailing turns included in the compiled prompt.
    pub history_window: usize,
    /// Trailing turns scanned for emotional drift.
    pub drift_window: usize,
    pub max_reply_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            drift_window: 4,
            max_reply_chars: 300,
        }
    }
}

/// SSE streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Pause between word chunks.
    pub chunk_delay_ms: u64,
    pub keep_alive_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_delay_ms: 40,
            keep_alive_secs: 15,
        }
    }
}
