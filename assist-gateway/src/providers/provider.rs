//! Provider trait for abstracting the LLM backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::history::ChatMessage;
use crate::prompt::SystemBlock;
use crate::tools::Tool;

/// Content block returned by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderContentBlock {
    /// Text content
    Text { text: String },
    /// Tool use request from the model
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Unified response type across providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ProviderContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<ProviderUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Provider error types
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("No content in response")]
    NoContent,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
}

/// Provider trait for different LLM backends
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Current model
    fn model(&self) -> &str;

    /// Send a simple single-turn message.
    async fn send_message(&self, content: &str) -> Result<ProviderResponse, ProviderError> {
        self.send_conversation(None, vec![ChatMessage::user_text(content)], vec![])
            .await
    }

    /// Send a conversation and get the next assistant turn
    async fn send_conversation(
        &self,
        system: Option<Vec<SystemBlock>>,
        history: Vec<ChatMessage>,
        tools: Vec<&dyn Tool>,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Extract all text content from a response
pub fn extract_all_text(response: &ProviderResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|block| match block {
            ProviderContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract tool uses from a response
pub fn extract_tool_uses(response: &ProviderResponse) -> Vec<(String, String, Value)> {
    response
        .content
        .iter()
        .filter_map(|block| match block {
            ProviderContentBlock::ToolUse { id, name, input } => {
                Some((id.clone(), name.clone(), input.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Check if the response has tool uses
pub fn has_tool_uses(response: &ProviderResponse) -> bool {
    response
        .content
        .iter()
        .any(|block| matches!(block, ProviderContentBlock::ToolUse { .. }))
}
