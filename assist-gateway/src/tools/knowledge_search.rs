use serde::Deserialize;
use serde_json::{Value, json};

use crate::tools::{Tool, ToolContext};

const MAX_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct KnowledgeSearchInput {
    query: String,
    limit: Option<usize>,
}

pub struct KnowledgeSearchTool;

#[async_trait::async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "search_knowledge_base"
    }

    fn description(&self) -> &str {
        "Search the knowledge base for documentation and code examples relevant to a query."
    }

    fn prompt(&self) -> Option<&'static str> {
        Some(
            "You have a knowledge base. Search it with `search_knowledge_base` before answering \
             questions about the documented framework, and prefer what it returns over memory.",
        )
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query string."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of documents to return (default from configuration)."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, context: &mut ToolContext) -> Result<String, String> {
        let input: KnowledgeSearchInput =
            serde_json::from_value(args).map_err(|e| e.to_string())?;

        let knowledge = context.knowledge().ok_or("knowledge base not available")?;

        let limit = input.limit.map(|limit| limit.clamp(1, MAX_LIMIT));
        let hits = knowledge
            .search(&input.query, limit)
            .await
            .map_err(|e| e.to_string())?;

        if hits.is_empty() {
            return Ok("No documents found".to_string());
        }

        serde_json::to_string_pretty(&hits).map_err(|e| e.to_string())
    }
}
