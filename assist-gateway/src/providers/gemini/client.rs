//! Google Gemini API client.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::chat::history::ChatMessage;
use crate::prompt::SystemBlock;
use crate::providers::gemini::history::{GeminiContent, to_gemini_contents};
use crate::providers::provider::{
    Provider, ProviderContentBlock, ProviderError, ProviderResponse, ProviderUsage,
};
use crate::tools::Tool;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_output_tokens: Option<u32>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Request body for the Gemini generateContent API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclaration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<SystemPart>,
}

#[derive(Debug, Serialize)]
struct SystemPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclaration {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Response from the generateContent API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: CandidateContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
    #[serde(default)]
    pub role: String,
}

/// Candidate part. Parts this client does not use are kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidatePart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCallData,
    },
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallData {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_output_tokens: Some(8192),
        })
    }

    /// Point the client at another endpoint (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Call `generateContent` and return the parsed body.
    pub async fn generate_content(
        &self,
        system: Option<Vec<SystemBlock>>,
        history: Vec<ChatMessage>,
        tools: Vec<&dyn Tool>,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let system_instruction = system
            .filter(|blocks| !blocks.is_empty())
            .map(|blocks| SystemInstruction {
                parts: blocks
                    .into_iter()
                    .map(|b| SystemPart { text: b.text })
                    .collect(),
            });

        let tool_declarations = if tools.is_empty() {
            None
        } else {
            Some(vec![ToolDeclaration {
                function_declarations: tools
                    .iter()
                    .map(|tool| FunctionDeclaration {
                        name: tool.name().to_string(),
                        description: tool.description().to_string(),
                        parameters: sanitize_schema(tool.input_schema()),
                    })
                    .collect(),
            }])
        };

        let request_body = GenerateContentRequest {
            contents: to_gemini_contents(history),
            system_instruction,
            tools: tool_declarations,
            generation_config: Some(GenerationConfig {
                max_output_tokens: self.max_output_tokens,
            }),
        };

        debug!(model = %self.model, turns = request_body.contents.len(), "sending Gemini request");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: response_text,
            });
        }

        Ok(serde_json::from_str(&response_text)?)
    }
}

#[async_trait::async_trait]
impl Provider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send_conversation(
        &self,
        system: Option<Vec<SystemBlock>>,
        history: Vec<ChatMessage>,
        tools: Vec<&dyn Tool>,
    ) -> Result<ProviderResponse, ProviderError> {
        let response = self.generate_content(system, history, tools).await?;
        to_provider_response(response, &self.model)
    }
}

/// Map the first candidate of a Gemini response into provider blocks.
pub fn to_provider_response(
    response: GenerateContentResponse,
    model: &str,
) -> Result<ProviderResponse, ProviderError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(ProviderError::NoContent)?;

    let mut content = Vec::new();
    for part in candidate.content.parts {
        match part {
            CandidatePart::Text { text } => {
                content.push(ProviderContentBlock::Text { text });
            }
            CandidatePart::FunctionCall { function_call } => {
                // Gemini has no call ids; generate one to pair results.
                content.push(ProviderContentBlock::ToolUse {
                    id: format!("call_{}", uuid::Uuid::new_v4()),
                    name: function_call.name,
                    input: function_call.args,
                });
            }
            CandidatePart::Other(_) => {}
        }
    }

    let usage = response.usage_metadata.map(|u| ProviderUsage {
        input_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
    });

    Ok(ProviderResponse {
        id: uuid::Uuid::new_v4().to_string(),
        model: response.model_version.unwrap_or_else(|| model.to_string()),
        content,
        usage,
        stop_reason: candidate.finish_reason,
    })
}

/// Recursively strip JSON Schema fields that Gemini's FunctionDeclaration
/// parameters do not support. Currently removes `additionalProperties` at
/// every nesting level.
fn sanitize_schema(mut schema: Value) -> Value {
    strip_unsupported_fields(&mut schema);
    schema
}

fn strip_unsupported_fields(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };

    obj.remove("additionalProperties");

    for child in obj.values_mut() {
        strip_unsupported_fields(child);
    }
}
