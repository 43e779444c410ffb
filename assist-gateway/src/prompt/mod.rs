//! System prompt assembly.
//!
//! The prompt is built from the agent description, its instructions, a few
//! optional directives (markdown, current time) and the prompts contributed
//! by registered tools. Providers receive it as ordered [`SystemBlock`]s.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::Tool;

/// Built-in agent description.
pub const DEFAULT_DESCRIPTION: &str = include_str!("../../prompts/description.md");
/// Built-in agent instructions.
pub const DEFAULT_INSTRUCTIONS: &str = include_str!("../../prompts/instructions.md");

const MARKDOWN_DIRECTIVE: &str = "Use markdown to format your answers.";

/// A block of system prompt text as sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
}

/// A block of prompt content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBlock {
    pub content: String,
}

impl PromptBlock {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// The complete system prompt composed of multiple blocks
#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    /// Description and instructions
    pub instructions: Vec<PromptBlock>,
    /// Per-run context such as the current time
    pub context: Vec<PromptBlock>,
    /// Prompts contributed by tools
    pub tools: Vec<PromptBlock>,
}

impl SystemPrompt {
    /// Start a prompt from the agent description and instructions.
    pub fn new(description: &str, instructions: &str) -> Self {
        let mut prompt = Self::default();
        prompt.add_instruction(description);
        if !instructions.trim().is_empty() {
            prompt.add_instruction(format!("<instructions>\n{}\n</instructions>", instructions.trim()));
        }
        prompt
    }

    /// Add an instruction block. Blank content is ignored.
    pub fn add_instruction(&mut self, content: impl Into<String>) {
        let content = content.into();
        if !content.trim().is_empty() {
            self.instructions.push(PromptBlock::new(content.trim()));
        }
    }

    pub fn add_context(&mut self, content: impl Into<String>) {
        self.context.push(PromptBlock::new(content));
    }

    pub fn add_markdown_directive(&mut self) {
        self.add_context(MARKDOWN_DIRECTIVE);
    }

    pub fn add_datetime(&mut self, now: DateTime<Utc>) {
        self.add_context(format!(
            "The current time is {} UTC.",
            now.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    /// Collect the non-empty prompts of `tools` into one block.
    pub fn add_tools_prompts(&mut self, tools: &[&dyn Tool]) {
        let tool_prompts: Vec<&str> = tools.iter().filter_map(|tool| tool.prompt()).collect();

        if !tool_prompts.is_empty() {
            self.tools.push(PromptBlock::new(tool_prompts.join("\n\n")));
        }
    }

    /// Get all blocks in order (instructions, context, tools)
    pub fn all_blocks(&self) -> Vec<&PromptBlock> {
        self.instructions
            .iter()
            .chain(self.context.iter())
            .chain(self.tools.iter())
            .collect()
    }

    pub fn to_system_blocks(&self) -> Vec<SystemBlock> {
        self.all_blocks()
            .into_iter()
            .map(|block| SystemBlock {
                text: block.content.clone(),
            })
            .collect()
    }

    pub fn to_simple_string(&self) -> String {
        self.all_blocks()
            .iter()
            .map(|b| b.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Read a prompt override from `path`, or fall back to the built-in text.
pub fn load_prompt(path: Option<&str>, fallback: &str) -> std::io::Result<String> {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => std::fs::read_to_string(Path::new(path)),
        None => Ok(fallback.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_prompt_sections() {
        let prompt = SystemPrompt::new(DEFAULT_DESCRIPTION, DEFAULT_INSTRUCTIONS);
        assert_eq!(prompt.instructions.len(), 2);
        let text = prompt.to_simple_string();
        assert!(text.contains("search_knowledge_base"));
        assert!(text.contains("<instructions>"));
        assert!(!text.contains("create_image"));
    }

    #[test]
    fn test_context_directives_follow_instructions() {
        let mut prompt = SystemPrompt::new("You help.", "");
        prompt.add_markdown_directive();
        prompt.add_datetime(Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap());

        let blocks = prompt.to_system_blocks();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].text, "You help.");
        assert_eq!(blocks[1].text, MARKDOWN_DIRECTIVE);
        assert_eq!(blocks[2].text, "The current time is 2025-03-01 09:30:00 UTC.");
    }

    #[test]
    fn test_load_prompt_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("description.md");
        std::fs::write(&path, "Custom description").unwrap();

        let loaded = load_prompt(path.to_str(), DEFAULT_DESCRIPTION).unwrap();
        assert_eq!(loaded, "Custom description");
        assert_eq!(load_prompt(Some("  "), "fallback").unwrap(), "fallback");
        assert!(load_prompt(Some("/definitely/not/here.md"), "x").is_err());
    }
}
