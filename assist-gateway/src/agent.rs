use std::sync::Arc;

use assist_core::AgentSettings;
use assist_db::{ContentBlock, DbError, MessageRole, SessionDbPool, SessionRepository};
use assist_knowledge::UrlKnowledge;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::chat::{
    ChatContentBlock, ChatMessage, ChatRole, ToolResultData, build_history_messages,
    build_tool_result_message, tool_results_to_blocks,
};
use crate::prompt::{DEFAULT_DESCRIPTION, DEFAULT_INSTRUCTIONS, SystemPrompt};
use crate::providers::{
    Provider, ProviderContentBlock, ProviderError, ProviderResponse, extract_all_text,
    has_tool_uses,
};
use crate::tools::{ToolContext, ToolManager};

/// Errors that can occur during an agent run
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Model error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Model still requested tools after {0} iterations")]
    ToolLimit(usize),
}

/// One user turn sent to the agent
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl RunRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            user_id: None,
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// The agent's answer to a [`RunRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub session_id: String,
    pub run_id: String,
    pub content: String,
    pub model: String,
    pub tools_used: Vec<String>,
}

/// Public description of an agent, as listed by the playground
#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub model: String,
    pub tools: Vec<String>,
    pub knowledge: Option<KnowledgeInfo>,
    pub storage: StorageInfo,
    pub add_history_to_messages: bool,
    pub num_history_responses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeInfo {
    pub collection: String,
    pub search_type: String,
    pub sources: Vec<String>,
    pub embedder: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub namespace: String,
}

/// A model, its tools and its memory, answering one run at a time per request
///
/// Owns everything needed to turn a user message into an answer: the
/// system prompt, history replay, the tool loop and persistence of every
/// step into the session store.
pub struct Agent {
    id: String,
    name: String,
    provider: Arc<dyn Provider>,
    description: String,
    instructions: String,
    knowledge: Option<Arc<UrlKnowledge>>,
    sessions: SessionDbPool,
    tools: ToolManager,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        sessions: SessionDbPool,
        tools: ToolManager,
        settings: AgentSettings,
    ) -> Self {
        Self {
            id: agent_id(&settings.name),
            name: settings.name.clone(),
            provider,
            description: DEFAULT_DESCRIPTION.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            knowledge: None,
            sessions,
            tools,
            settings,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<UrlKnowledge>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn sessions(&self) -> &SessionDbPool {
        &self.sessions
    }

    pub fn knowledge(&self) -> Option<&Arc<UrlKnowledge>> {
        self.knowledge.as_ref()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            tools: self.tools.names().into_iter().map(str::to_string).collect(),
            knowledge: self.knowledge.as_ref().map(|knowledge| KnowledgeInfo {
                collection: knowledge.collection().to_string(),
                search_type: knowledge.search_type().to_string(),
                sources: knowledge.sources().to_vec(),
                embedder: knowledge.embedder_model().to_string(),
            }),
            storage: StorageInfo {
                namespace: self.sessions.namespace().to_string(),
            },
            add_history_to_messages: self.settings.add_history_to_messages,
            num_history_responses: self.settings.num_history_responses,
        }
    }

    /// Build the system prompt for a run started now
    pub fn system_prompt(&self) -> SystemPrompt {
        let mut prompt = SystemPrompt::new(&self.description, &self.instructions);
        if self.settings.markdown {
            prompt.add_markdown_directive();
        }
        if self.settings.add_datetime_to_instructions {
            prompt.add_datetime(Utc::now());
        }
        prompt.add_tools_prompts(&self.tools.get_tools());
        prompt
    }

    /// Answer one user message
    ///
    /// 1. Gets or creates the session
    /// 2. Loads history of previous completed runs (if enabled)
    /// 3. Starts a run and saves the user message
    /// 4. Calls the model, running requested tools until it answers in text
    /// 5. Saves the answer and marks the run complete
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, AgentError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(AgentError::EmptyMessage);
        }

        let pool = self.sessions.pool();
        let session = SessionRepository::get_or_create(
            pool,
            self.sessions.namespace(),
            &self.name,
            request.session_id.as_deref(),
            request.user_id.as_deref(),
        )
        .await?;

        let mut conversation = if self.settings.add_history_to_messages {
            let previous = SessionRepository::recent_run_messages(
                pool,
                &session.id,
                self.settings.num_history_responses,
            )
            .await?;
            build_history_messages(&previous)
        } else {
            Vec::new()
        };

        let run = SessionRepository::start_run(pool, &session.id).await?;
        info!(session_id = %session.id, run_id = %run.id, history = conversation.len(), "run started");

        SessionRepository::add_message(
            pool,
            &session.id,
            &run.id,
            MessageRole::User,
            vec![ContentBlock::Text {
                text: message.to_string(),
            }],
            None,
        )
        .await?;
        conversation.push(ChatMessage::user_text(message));

        let system_blocks = self.system_prompt().to_system_blocks();
        let tools = self.tools.get_tools();
        let mut context = ToolContext::new(session.id.clone()).with_sessions(self.sessions.clone());
        if let Some(knowledge) = &self.knowledge {
            context = context.with_knowledge(Arc::clone(knowledge));
        }

        let mut tools_used = Vec::new();
        let mut response = self
            .provider
            .send_conversation(Some(system_blocks.clone()), conversation.clone(), tools.clone())
            .await?;

        for iteration in 0..self.settings.max_tool_iterations {
            if !has_tool_uses(&response) {
                break;
            }
            info!(session_id = %session.id, iteration = iteration + 1, "tool use requested");

            let assistant_turn = assistant_blocks(&response);
            self.save_message(&session.id, &run.id, MessageRole::Assistant, to_stored(&assistant_turn))
                .await?;
            conversation.push(ChatMessage {
                role: ChatRole::Assistant,
                content: assistant_turn,
            });

            let results = self
                .execute_tools(&response, &mut context, &mut tools_used)
                .await;
            self.save_message(
                &session.id,
                &run.id,
                MessageRole::User,
                tool_results_to_blocks(&results),
            )
            .await?;
            conversation.push(build_tool_result_message(&results));

            response = self
                .provider
                .send_conversation(Some(system_blocks.clone()), conversation.clone(), tools.clone())
                .await?;
        }

        if has_tool_uses(&response) {
            warn!(
                session_id = %session.id,
                limit = self.settings.max_tool_iterations,
                "tool iteration limit reached"
            );
            return Err(AgentError::ToolLimit(self.settings.max_tool_iterations));
        }

        let content = extract_all_text(&response);
        self.save_message(
            &session.id,
            &run.id,
            MessageRole::Assistant,
            vec![ContentBlock::Text {
                text: content.clone(),
            }],
        )
        .await?;
        SessionRepository::complete_run(pool, &run.id).await?;

        info!(
            session_id = %session.id,
            run_id = %run.id,
            model = self.provider.model(),
            chars = content.len(),
            tools = tools_used.len(),
            "run completed"
        );

        Ok(RunResponse {
            session_id: session.id,
            run_id: run.id,
            content,
            model: self.provider.model().to_string(),
            tools_used,
        })
    }

    async fn save_message(
        &self,
        session_id: &str,
        run_id: &str,
        role: MessageRole,
        content: Vec<ContentBlock>,
    ) -> Result<(), AgentError> {
        let model = matches!(role, MessageRole::Assistant).then(|| self.provider.model());
        SessionRepository::add_message(self.sessions.pool(), session_id, run_id, role, content, model)
            .await?;
        Ok(())
    }

    /// Execute all tool_use blocks from a response and return the results
    async fn execute_tools(
        &self,
        response: &ProviderResponse,
        context: &mut ToolContext,
        tools_used: &mut Vec<String>,
    ) -> Vec<ToolResultData> {
        let mut results = Vec::new();

        for block in &response.content {
            let ProviderContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };

            info!(session_id = context.session_id(), tool = %name, id = %id, "executing tool");
            let (content, is_error) = match self
                .tools
                .execute_with_context(name, input.clone(), context)
                .await
            {
                Ok(output) => (output, false),
                Err(e) => {
                    error!(tool = %name, error = %e, "tool failed");
                    (e, true)
                }
            };

            if !tools_used.contains(name) {
                tools_used.push(name.clone());
            }
            results.push(ToolResultData {
                tool_use_id: id.clone(),
                name: name.clone(),
                content,
                is_error,
            });
        }

        results
    }
}

/// Stable URL id derived from the agent name, e.g. "Docs Assist" -> "docs-assist".
pub fn agent_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
        } else if !id.ends_with('-') && !id.is_empty() {
            id.push('-');
        }
    }
    let id = id.trim_end_matches('-');
    if id.is_empty() {
        "agent".to_string()
    } else {
        id.to_string()
    }
}

fn assistant_blocks(response: &ProviderResponse) -> Vec<ChatContentBlock> {
    response
        .content
        .iter()
        .map(|block| match block {
            ProviderContentBlock::Text { text } => ChatContentBlock::Text { text: text.clone() },
            ProviderContentBlock::ToolUse { id, name, input } => ChatContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
        })
        .collect()
}

fn to_stored(blocks: &[ChatContentBlock]) -> Vec<ContentBlock> {
    blocks
        .iter()
        .map(|block| match block {
            ChatContentBlock::Text { text } => ContentBlock::Text { text: text.clone() },
            ChatContentBlock::ToolUse { id, name, input } => ContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            ChatContentBlock::ToolResult {
                tool_use_id,
                name,
                content,
                is_error,
            } => ContentBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                name: name.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
        })
        .collect()
}
