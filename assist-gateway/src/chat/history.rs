//! Provider-neutral chat history types and builders.

use assist_db::{ContentBlock, Message, MessageRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role in provider-neutral chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Content block in provider-neutral history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        /// Name of the tool that produced the result
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Provider-neutral chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ChatContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: vec![ChatContentBlock::Text { text: text.into() }],
        }
    }
}

/// Tool result data for building history messages.
#[derive(Debug, Clone)]
pub struct ToolResultData {
    pub tool_use_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

/// Build history messages from stored messages, oldest first.
pub fn build_history_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(convert_message)
        .filter(|message| !message.content.is_empty())
        .collect()
}

fn convert_message(msg: &Message) -> ChatMessage {
    ChatMessage {
        role: match msg.role {
            MessageRole::User => ChatRole::User,
            MessageRole::Assistant => ChatRole::Assistant,
        },
        content: msg.content.iter().map(convert_content_block).collect(),
    }
}

fn convert_content_block(block: &ContentBlock) -> ChatContentBlock {
    match block {
        ContentBlock::Text { text } => ChatContentBlock::Text { text: text.clone() },
        ContentBlock::ToolUse { id, name, input } => ChatContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            name,
            content,
            is_error,
        } => ChatContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            name: name.clone(),
            content: content.clone(),
            is_error: *is_error,
        },
    }
}

/// Build a user tool-result message.
pub fn build_tool_result_message(results: &[ToolResultData]) -> ChatMessage {
    ChatMessage {
        role: ChatRole::User,
        content: results
            .iter()
            .map(|result| ChatContentBlock::ToolResult {
                tool_use_id: result.tool_use_id.clone(),
                name: result.name.clone(),
                content: result.content.clone(),
                is_error: result.is_error,
            })
            .collect(),
    }
}

/// Stored form of tool results.
pub fn tool_results_to_blocks(results: &[ToolResultData]) -> Vec<ContentBlock> {
    results
        .iter()
        .map(|result| ContentBlock::ToolResult {
            tool_use_id: result.tool_use_id.clone(),
            name: result.name.clone(),
            content: result.content.clone(),
            is_error: result.is_error,
        })
        .collect()
}
