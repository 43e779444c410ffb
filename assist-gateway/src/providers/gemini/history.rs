//! Conversion between neutral chat history and the Gemini API format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::history::{ChatContentBlock, ChatMessage, ChatRole};

/// Gemini API content structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

/// Gemini API content part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

/// Gemini function call structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

/// Gemini function response structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: FunctionResponseData,
}

/// Function response data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponseData {
    pub name: String,
    pub content: String,
}

/// Convert neutral history to Gemini contents.
///
/// Gemini rejects empty turns, so messages without parts are dropped.
pub fn to_gemini_contents(history: Vec<ChatMessage>) -> Vec<GeminiContent> {
    let mut contents = Vec::new();
    for msg in history {
        let role = match msg.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        };

        let mut parts = Vec::new();
        for block in msg.content {
            match block {
                ChatContentBlock::Text { text } => {
                    if !text.is_empty() {
                        parts.push(GeminiPart::Text { text });
                    }
                }
                ChatContentBlock::ToolUse { id: _, name, input } => {
                    parts.push(GeminiPart::FunctionCall {
                        function_call: FunctionCall { name, args: input },
                    });
                }
                ChatContentBlock::ToolResult {
                    tool_use_id: _,
                    name,
                    content,
                    is_error,
                } => {
                    let content = if is_error {
                        format!("Error: {}", content)
                    } else {
                        content
                    };
                    parts.push(GeminiPart::FunctionResponse {
                        function_response: FunctionResponse {
                            name: name.clone(),
                            response: FunctionResponseData { name, content },
                        },
                    });
                }
            }
        }

        if !parts.is_empty() {
            contents.push(GeminiContent {
                role: role.to_string(),
                parts,
            });
        }
    }

    contents
}
