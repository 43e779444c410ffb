use std::sync::Arc;

use assist_core::{Config, WorkspacePaths};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    Tool, ToolContext,
    chat_history::ChatHistoryTool,
    knowledge_search::KnowledgeSearchTool,
    python::{ListFilesTool, PythonToolkit, ReadFileTool, RunPythonFileTool, SaveToFileAndRunTool},
    speech::{GetVoicesTool, SoundEffectTool, SpeechToolkit, TextToSpeechTool},
};
use crate::speech::{ElevenLabsClient, SpeechError};

/// Central manager for the tools an agent may call
///
/// Owns the tool instances and provides a unified interface for listing
/// and executing them. Which tools exist depends on configuration and on
/// the credentials present at startup.
pub struct ToolManager {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolManager {
    /// A manager with no tools; add them with [`register`](Self::register).
    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            warn!(tool = tool.name(), "tool already registered, ignoring duplicate");
            return;
        }
        self.tools.push(tool);
    }

    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Register the tool set described by `config`.
    pub fn from_config(config: &Config, paths: &WorkspacePaths) -> Result<Self, SpeechError> {
        let settings = &config.settings;
        let mut manager = Self::empty().with_tool(Box::new(KnowledgeSearchTool));

        if settings.agent.read_chat_history {
            manager.register(Box::new(ChatHistoryTool));
        }

        let python = &settings.tools.python;
        if python.enabled {
            let toolkit = Arc::new(PythonToolkit::new(&paths.python_dir, python));
            manager.register(Box::new(SaveToFileAndRunTool::new(Arc::clone(&toolkit))));
            manager.register(Box::new(RunPythonFileTool::new(Arc::clone(&toolkit))));
            if python.read_files {
                manager.register(Box::new(ReadFileTool::new(Arc::clone(&toolkit))));
            }
            if python.list_files {
                manager.register(Box::new(ListFilesTool::new(toolkit)));
            }
        }

        let speech = &settings.tools.speech;
        match (speech.enabled, config.eleven_labs_api_key()) {
            (true, Some(api_key)) => {
                let mut client = ElevenLabsClient::new(api_key)?;
                if let Some(base_url) = speech.base_url.as_deref() {
                    client = client.with_base_url(base_url);
                }
                let toolkit = Arc::new(SpeechToolkit::new(client, speech, &paths.audio_dir));
                manager.register(Box::new(TextToSpeechTool::new(Arc::clone(&toolkit))));
                manager.register(Box::new(GetVoicesTool::new(Arc::clone(&toolkit))));
                manager.register(Box::new(SoundEffectTool::new(toolkit)));
            }
            (true, None) => {
                warn!("ELEVEN_LABS_API_KEY is not set; speech tools are disabled");
            }
            (false, _) => {}
        }

        info!(tools = ?manager.names(), "tools registered");
        Ok(manager)
    }

    /// Get all tools as references for use with the provider API
    pub fn get_tools(&self) -> Vec<&dyn Tool> {
        self.tools.iter().map(|t| t.as_ref()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Execute a tool by name with the given input and context
    pub async fn execute_with_context(
        &self,
        name: &str,
        input: Value,
        context: &mut ToolContext,
    ) -> Result<String, String> {
        for tool in &self.tools {
            if tool.name() == name {
                return tool.execute(input, context).await;
            }
        }
        Err(format!("Unknown tool: {}", name))
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::empty()
    }
}
