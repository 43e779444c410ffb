//! Configuration management for assist.
//!
//! Secrets come from environment variables, settings from a TOML file.
//!
//! # Configuration Sources
//!
//! ## Secrets (Environment Variables)
//! - `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) - model and embedding backend
//! - `ELEVEN_LABS_API_KEY` - speech tools, optional
//!
//! ## Settings (TOML File)
//! Located at `~/.config/assist/config.toml` unless `--config` is given:
//! ```toml
//! [agent]
//! name = "Assist"
//! num_history_responses = 3
//!
//! [knowledge]
//! urls = ["https://docs.example.com/llms-full.txt"]
//! search_type = "hybrid"
//!
//! [gateway]
//! port = 7777
//! ```

pub mod knowledge;
mod secrets;
mod settings;

use std::path::Path;

pub use knowledge::{KnowledgeSettings, SearchDefaults, SearchType};
pub use secrets::{Secrets, SecretsError};
pub use settings::{
    AgentSettings, GatewaySettings, LoggingSettings, ModelSettings, PathSettings,
    PythonToolSettings, Settings, SettingsError, SpeechToolSettings, StorageSettings,
    ToolsSettings,
};

/// Combined configuration containing both secrets and settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Secrets loaded from environment variables
    pub secrets: Secrets,
    /// Settings loaded from TOML configuration file
    pub settings: Settings,
}

/// Errors that can occur when loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Unsupported model provider '{0}' (supported: gemini)")]
    UnsupportedProvider(String),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// With `path`, settings are read from that file; otherwise from the
    /// default location, which is created with defaults when missing.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let secrets = Secrets::from_env()?;
        let settings = match path {
            Some(path) => Settings::load_from_path(path)?,
            None => Settings::load()?,
        };
        Self::from_parts(secrets, settings)
    }

    /// Validate and combine already loaded parts.
    pub fn from_parts(secrets: Secrets, settings: Settings) -> Result<Self, ConfigError> {
        let provider = settings.model.provider.trim().to_lowercase();
        if provider != "gemini" {
            return Err(ConfigError::UnsupportedProvider(settings.model.provider.clone()));
        }
        secrets.require_gemini()?;

        if settings.model.id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model.id",
                reason: "must not be empty".to_string(),
            });
        }
        if settings.agent.max_tool_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "agent.max_tool_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if settings.knowledge.embedding_batch == 0 {
            return Err(ConfigError::Invalid {
                field: "knowledge.embedding_batch",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self { secrets, settings })
    }

    /// Get the Gemini API key. Present after validation.
    pub fn gemini_api_key(&self) -> &str {
        self.secrets.gemini_api_key.as_deref().unwrap_or_default()
    }

    /// Get the ElevenLabs API key (if configured).
    pub fn eleven_labs_api_key(&self) -> Option<&str> {
        self.secrets.eleven_labs_api_key.as_deref()
    }

    /// Speech tools are enabled in settings and have a key.
    pub fn speech_enabled(&self) -> bool {
        self.settings.tools.speech.enabled && self.secrets.has_speech()
    }

    /// Get the HTTP bind address.
    pub fn bind_addr(&self) -> String {
        self.settings.bind_addr()
    }
}

/// Load .env file if it exists (for development convenience).
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Serialises tests that modify environment variables.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
