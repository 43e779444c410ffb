//! Secrets configuration loaded from environment variables only.
//!
//! API keys are never read from files under version control. A `.env`
//! file is honoured for local development through `dotenvy`.

use std::env;

/// Secrets loaded exclusively from environment variables.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Gemini API key (env: GEMINI_API_KEY, fallback GOOGLE_API_KEY)
    pub gemini_api_key: Option<String>,

    /// ElevenLabs API key (env: ELEVEN_LABS_API_KEY)
    pub eleven_labs_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field(
                "eleven_labs_api_key",
                &self.eleven_labs_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Errors that can occur when loading secrets
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("Missing required secret: {0}")]
    MissingSecret(String),
}

impl Secrets {
    /// Load secrets from environment variables, reading `.env` first if present.
    pub fn from_env() -> Result<Self, SecretsError> {
        let _ = dotenvy::dotenv();

        Self::from_env_inner()
    }

    /// Internal method to load from environment without loading .env
    pub(crate) fn from_env_inner() -> Result<Self, SecretsError> {
        Ok(Self {
            gemini_api_key: read_var("GEMINI_API_KEY").or_else(|| read_var("GOOGLE_API_KEY")),
            eleven_labs_api_key: read_var("ELEVEN_LABS_API_KEY"),
        })
    }

    /// Gemini key, or an error naming the variable to set.
    pub fn require_gemini(&self) -> Result<&str, SecretsError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| SecretsError::MissingSecret("GEMINI_API_KEY".to_string()))
    }

    pub fn has_speech(&self) -> bool {
        self.eleven_labs_api_key.is_some()
    }
}

/// Blank values count as unset.
fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
