use assist_db::SessionRepository;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::tools::{Tool, ToolContext};

const DEFAULT_NUM_CHATS: usize = 10;

#[derive(Debug, Default, Deserialize)]
struct ChatHistoryInput {
    num_chats: Option<usize>,
}

/// Reads earlier exchanges of the current session.
pub struct ChatHistoryTool;

#[async_trait::async_trait]
impl Tool for ChatHistoryTool {
    fn name(&self) -> &str {
        "get_chat_history"
    }

    fn description(&self) -> &str {
        "Return previous user/assistant exchanges of this conversation as JSON, oldest first."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "num_chats": {
                    "type": "integer",
                    "description": "Number of most recent exchanges to return (default 10)."
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, context: &mut ToolContext) -> Result<String, String> {
        let input: ChatHistoryInput = if args.is_null() {
            ChatHistoryInput::default()
        } else {
            serde_json::from_value(args).map_err(|e| e.to_string())?
        };
        let sessions = context.sessions().ok_or("session store not available")?;

        let turns = SessionRepository::chat_history(
            sessions.pool(),
            context.session_id(),
            input.num_chats.unwrap_or(DEFAULT_NUM_CHATS).max(1),
        )
        .await
        .map_err(|e| e.to_string())?;

        let history: Vec<Value> = turns
            .iter()
            .map(|turn| json!({"user": turn.user, "assistant": turn.assistant}))
            .collect();
        serde_json::to_string_pretty(&history).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assist_db::{ContentBlock, MessageRole, test_helpers::create_test_session_pool};

    async fn exchange(pool: &assist_db::SessionDbPool, session_id: &str, user: &str, answer: &str) {
        let run = SessionRepository::start_run(pool.pool(), session_id).await.unwrap();
        for (role, text) in [(MessageRole::User, user), (MessageRole::Assistant, answer)] {
            SessionRepository::add_message(
                pool.pool(),
                session_id,
                &run.id,
                role,
                vec![ContentBlock::Text {
                    text: text.to_string(),
                }],
                None,
            )
            .await
            .unwrap();
        }
        SessionRepository::complete_run(pool.pool(), &run.id).await.unwrap();
    }

    #[tokio::test]
    async fn returns_recent_pairs_for_current_session() {
        let pool = create_test_session_pool().await.unwrap();
        let session =
            SessionRepository::create(pool.pool(), pool.namespace(), "Assist", None, None)
                .await
                .unwrap();
        exchange(&pool, &session.id, "first question", "first answer").await;
        exchange(&pool, &session.id, "second question", "second answer").await;

        let mut context = ToolContext::new(session.id.clone()).with_sessions(pool.clone());
        let output = ChatHistoryTool
            .execute(json!({"num_chats": 1}), &mut context)
            .await
            .unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["user"], "second question");
        assert_eq!(parsed[0]["assistant"], "second answer");

        let all = ChatHistoryTool.execute(json!({}), &mut context).await.unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&all).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn missing_store_is_an_error() {
        let mut context = ToolContext::new_for_tests();
        assert!(ChatHistoryTool.execute(json!({}), &mut context).await.is_err());
    }
}
