#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use assist_core::{AgentSettings, KnowledgeSettings, SearchType};
use assist_db::test_helpers::create_test_session_pool;
use assist_gateway::agent::Agent;
use assist_gateway::chat::ChatMessage;
use assist_gateway::prompt::SystemBlock;
use assist_gateway::providers::{
    Provider, ProviderContentBlock, ProviderError, ProviderResponse,
};
use assist_gateway::tools::{Tool, ToolManager};
use assist_knowledge::{
    Embedder, EmbeddingTask, FetchedPage, KnowledgeError, KnowledgeResult, UrlKnowledge,
};
use serde_json::Value;
use tempfile::TempDir;

/// What the agent sent on one provider call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: Vec<SystemBlock>,
    pub history: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

/// Replays queued responses in order and records every request.
///
/// Once the queue is empty it answers with "done".
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn send_conversation(
        &self,
        system: Option<Vec<SystemBlock>>,
        history: Vec<ChatMessage>,
        tools: Vec<&dyn Tool>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.unwrap_or_default(),
            history,
            tools: tools.iter().map(|t| t.name().to_string()).collect(),
        });
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| text_response("done")))
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        id: "resp_text".to_string(),
        model: "scripted-model".to_string(),
        content: vec![ProviderContentBlock::Text {
            text: text.to_string(),
        }],
        usage: None,
        stop_reason: Some("STOP".to_string()),
    }
}

pub fn tool_call(id: &str, name: &str, input: Value) -> ProviderResponse {
    ProviderResponse {
        id: format!("resp_{id}"),
        model: "scripted-model".to_string(),
        content: vec![ProviderContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        usage: None,
        stop_reason: Some("STOP".to_string()),
    }
}

/// Stands in for the embedding backend in keyword-only collections.
pub struct NoEmbedder;

#[async_trait::async_trait]
impl Embedder for NoEmbedder {
    fn model(&self) -> &str {
        "none"
    }

    async fn embed_batch(
        &self,
        _inputs: &[String],
        _task: EmbeddingTask,
    ) -> KnowledgeResult<Vec<Vec<f32>>> {
        Err(KnowledgeError::Embedding(
            "embeddings are not available in tests".to_string(),
        ))
    }
}

pub fn agent_settings() -> AgentSettings {
    AgentSettings {
        add_datetime_to_instructions: false,
        ..AgentSettings::default()
    }
}

/// Agent over an in-memory session store.
pub async fn test_agent(
    provider: Arc<ScriptedProvider>,
    tools: ToolManager,
    settings: AgentSettings,
) -> Agent {
    let sessions = create_test_session_pool().await.unwrap();
    Agent::new(provider, sessions, tools, settings)
}

/// Keyword-searchable knowledge base holding one documentation page.
pub async fn docs_knowledge(dir: &TempDir) -> Arc<UrlKnowledge> {
    let settings = KnowledgeSettings {
        table_name: "docs".to_string(),
        search_type: SearchType::Keyword,
        ..Default::default()
    };
    let knowledge = UrlKnowledge::open(
        settings,
        &dir.path().join("knowledge.sqlite3"),
        Arc::new(NoEmbedder),
    )
    .await
    .unwrap();
    knowledge
        .ingest_page(
            &FetchedPage {
                url: "https://docs.example.com/storage".to_string(),
                title: "Storage".to_string(),
                content: "# Storage\n\nSessions are persisted in sqlite so the assistant \
                          remembers previous conversations across restarts."
                    .to_string(),
            },
            false,
        )
        .await
        .unwrap();
    Arc::new(knowledge)
}

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
