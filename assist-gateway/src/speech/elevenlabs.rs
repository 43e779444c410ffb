//! ElevenLabs REST client: text to speech, voice listing, sound effects.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ElevenLabs API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid ElevenLabs response: {0}")]
    InvalidResponse(String),
}

/// A voice available to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

#[derive(Clone)]
pub struct ElevenLabsClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for ElevenLabsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, SpeechError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Synthesize `text` with a voice. Returns the encoded audio bytes.
    pub async fn text_to_speech(
        &self,
        voice_id: &str,
        model_id: &str,
        output_format: &str,
        text: &str,
    ) -> Result<Vec<u8>, SpeechError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);
        debug!(voice_id, model_id, chars = text.len(), "requesting speech");

        let response = self
            .http_client
            .post(&url)
            .query(&[("output_format", output_format)])
            .header("xi-api-key", &self.api_key)
            .json(&json!({"text": text, "model_id": model_id}))
            .send()
            .await?;
        read_audio(response).await
    }

    /// Generate a sound effect from a description.
    pub async fn sound_effect(
        &self,
        text: &str,
        duration_seconds: Option<f32>,
        output_format: &str,
    ) -> Result<Vec<u8>, SpeechError> {
        let url = format!("{}/v1/sound-generation", self.base_url);
        let mut body = json!({"text": text});
        if let Some(duration) = duration_seconds {
            body["duration_seconds"] = json!(duration);
        }

        let response = self
            .http_client
            .post(&url)
            .query(&[("output_format", output_format)])
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        read_audio(response).await
    }

    pub async fn voices(&self) -> Result<Vec<Voice>, SpeechError> {
        let url = format!("{}/v1/voices", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SpeechError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        let parsed: VoicesResponse = serde_json::from_str(&text)
            .map_err(|e| SpeechError::InvalidResponse(e.to_string()))?;
        Ok(parsed.voices)
    }
}

async fn read_audio(response: reqwest::Response) -> Result<Vec<u8>, SpeechError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SpeechError::Api {
            status: status.as_u16(),
            message,
        });
    }
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(SpeechError::InvalidResponse("empty audio body".to_string()));
    }
    Ok(bytes.to_vec())
}

/// File extension for an ElevenLabs output format such as `mp3_44100_128`.
pub fn audio_extension(output_format: &str) -> &str {
    match output_format.split('_').next().unwrap_or_default() {
        "" => "mp3",
        codec => codec,
    }
}

/// Write audio into `dir` under a fresh name and return the path.
pub async fn save_audio(
    dir: &Path,
    prefix: &str,
    output_format: &str,
    audio: &[u8],
) -> Result<PathBuf, SpeechError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!(
        "{}_{}.{}",
        prefix,
        uuid::Uuid::new_v4().simple(),
        audio_extension(output_format)
    ));
    tokio::fs::write(&path, audio).await?;
    info!(path = %path.display(), bytes = audio.len(), "saved audio");
    Ok(path)
}
