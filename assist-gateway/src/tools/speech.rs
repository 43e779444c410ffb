use std::path::PathBuf;
use std::sync::Arc;

use assist_core::SpeechToolSettings;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::speech::{ElevenLabsClient, save_audio};
use crate::tools::{Tool, ToolContext};

/// Client plus the voice settings shared by the speech tools.
#[derive(Debug, Clone)]
pub struct SpeechToolkit {
    client: ElevenLabsClient,
    voice_id: String,
    model_id: String,
    output_format: String,
    target_dir: PathBuf,
}

impl SpeechToolkit {
    pub fn new(
        client: ElevenLabsClient,
        settings: &SpeechToolSettings,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            voice_id: settings.voice_id.clone(),
            model_id: settings.model_id.clone(),
            output_format: settings.output_format.clone(),
            target_dir: target_dir.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TextToSpeechInput {
    prompt: String,
}

pub struct TextToSpeechTool {
    toolkit: Arc<SpeechToolkit>,
}

impl TextToSpeechTool {
    pub fn new(toolkit: Arc<SpeechToolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait::async_trait]
impl Tool for TextToSpeechTool {
    fn name(&self) -> &str {
        "text_to_speech"
    }

    fn description(&self) -> &str {
        "Convert text to spoken audio with the pre-selected voice. Returns the path of the saved audio file."
    }

    fn prompt(&self) -> Option<&'static str> {
        Some(
            "`text_to_speech` turns a script into audio with a pre-selected voice; you never \
             need to choose a voice. The audio file path is returned to you.",
        )
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "Text to speak."}
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, _context: &mut ToolContext) -> Result<String, String> {
        let input: TextToSpeechInput = serde_json::from_value(args).map_err(|e| e.to_string())?;
        if input.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }

        let toolkit = &self.toolkit;
        let audio = toolkit
            .client
            .text_to_speech(
                &toolkit.voice_id,
                &toolkit.model_id,
                &toolkit.output_format,
                &input.prompt,
            )
            .await
            .map_err(|e| e.to_string())?;
        let path = save_audio(&toolkit.target_dir, "speech", &toolkit.output_format, &audio)
            .await
            .map_err(|e| e.to_string())?;

        Ok(format!("Audio generated successfully: {}", path.display()))
    }
}

pub struct GetVoicesTool {
    toolkit: Arc<SpeechToolkit>,
}

impl GetVoicesTool {
    pub fn new(toolkit: Arc<SpeechToolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait::async_trait]
impl Tool for GetVoicesTool {
    fn name(&self) -> &str {
        "get_voices"
    }

    fn description(&self) -> &str {
        "List the available voices with their id, name and description."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn execute(&self, _args: Value, _context: &mut ToolContext) -> Result<String, String> {
        let voices = self
            .toolkit
            .client
            .voices()
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&voices).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SoundEffectInput {
    prompt: String,
    duration_seconds: Option<f32>,
}

pub struct SoundEffectTool {
    toolkit: Arc<SpeechToolkit>,
}

impl SoundEffectTool {
    pub fn new(toolkit: Arc<SpeechToolkit>) -> Self {
        Self { toolkit }
    }
}

#[async_trait::async_trait]
impl Tool for SoundEffectTool {
    fn name(&self) -> &str {
        "generate_sound_effect"
    }

    fn description(&self) -> &str {
        "Generate a sound effect from a text description. Returns the path of the saved audio file."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string", "description": "Description of the sound."},
                "duration_seconds": {"type": "number", "description": "Length in seconds (0.5 to 22)."}
            },
            "required": ["prompt"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, _context: &mut ToolContext) -> Result<String, String> {
        let input: SoundEffectInput = serde_json::from_value(args).map_err(|e| e.to_string())?;
        if let Some(duration) = input.duration_seconds
            && !(0.5..=22.0).contains(&duration)
        {
            return Err("duration_seconds must be between 0.5 and 22".to_string());
        }

        let toolkit = &self.toolkit;
        let audio = toolkit
            .client
            .sound_effect(&input.prompt, input.duration_seconds, &toolkit.output_format)
            .await
            .map_err(|e| e.to_string())?;
        let path = save_audio(&toolkit.target_dir, "sound", &toolkit.output_format, &audio)
            .await
            .map_err(|e| e.to_string())?;

        Ok(format!("Sound effect generated successfully: {}", path.display()))
    }
}
