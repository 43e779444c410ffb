use assist_db::{ContentBlock, MessageRole, SessionDbPool, SessionRepository};

fn text(value: &str) -> Vec<ContentBlock> {
    vec![ContentBlock::Text {
        text: value.to_string(),
    }]
}

async fn open_temp_db(dir: &tempfile::TempDir) -> SessionDbPool {
    SessionDbPool::open(&dir.path().join("tmp").join("agent_sessions.db"), "assist_sessions")
        .await
        .unwrap()
}

/// Records one answered exchange and returns its run id.
async fn exchange(db: &SessionDbPool, session_id: &str, question: &str, answer: &str) -> String {
    let pool = db.pool();
    let run = SessionRepository::start_run(pool, session_id).await.unwrap();
    SessionRepository::add_message(pool, session_id, &run.id, MessageRole::User, text(question), None)
        .await
        .unwrap();
    SessionRepository::add_message(
        pool,
        session_id,
        &run.id,
        MessageRole::Assistant,
        vec![ContentBlock::ToolUse {
            id: "call_1".to_string(),
            name: "search_knowledge_base".to_string(),
            input: serde_json::json!({ "query": question }),
        }],
        Some("gemini-2.0-flash"),
    )
    .await
    .unwrap();
    SessionRepository::add_message(
        pool,
        session_id,
        &run.id,
        MessageRole::User,
        vec![ContentBlock::ToolResult {
            tool_use_id: "call_1".to_string(),
            name: "search_knowledge_base".to_string(),
            content: "[]".to_string(),
            is_error: false,
        }],
        None,
    )
    .await
    .unwrap();
    SessionRepository::add_message(
        pool,
        session_id,
        &run.id,
        MessageRole::Assistant,
        text(answer),
        Some("gemini-2.0-flash"),
    )
    .await
    .unwrap();
    SessionRepository::complete_run(pool, &run.id).await.unwrap();
    run.id
}

#[tokio::test]
async fn file_backed_store_creates_parent_directories_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let session_id = {
        let db = open_temp_db(&dir).await;
        let session =
            SessionRepository::create(db.pool(), db.namespace(), "Assist", Some("u1"), None)
                .await
                .unwrap();
        exchange(&db, &session.id, "What is a tool?", "A callable capability.").await;
        db.close().await;
        session.id
    };

    assert!(dir.path().join("tmp").join("agent_sessions.db").exists());

    let reopened = open_temp_db(&dir).await;
    let messages = SessionRepository::list_messages(reopened.pool(), &session_id)
        .await
        .unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].text(), "A callable capability.");
}

#[tokio::test]
async fn recent_run_messages_limits_to_last_completed_runs() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_temp_db(&dir).await;
    let pool = db.pool();
    let session = SessionRepository::create(pool, db.namespace(), "Assist", None, None)
        .await
        .unwrap();

    let mut runs = Vec::new();
    for i in 0..5 {
        runs.push(exchange(&db, &session.id, &format!("q{i}"), &format!("a{i}")).await);
    }

    // An unanswered run is never replayed.
    let open_run = SessionRepository::start_run(pool, &session.id).await.unwrap();
    SessionRepository::add_message(pool, &session.id, &open_run.id, MessageRole::User, text("pending"), None)
        .await
        .unwrap();

    let history = SessionRepository::recent_run_messages(pool, &session.id, 3)
        .await
        .unwrap();
    assert_eq!(history.len(), 12);
    assert_eq!(history.first().unwrap().run_id, runs[2]);
    assert_eq!(history.last().unwrap().run_id, runs[4]);
    assert!(history.iter().all(|m| m.run_id != open_run.id));

    assert!(
        SessionRepository::recent_run_messages(pool, &session.id, 0)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn chat_history_pairs_questions_with_final_answers() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_temp_db(&dir).await;
    let session = SessionRepository::create(db.pool(), db.namespace(), "Assist", None, None)
        .await
        .unwrap();

    exchange(&db, &session.id, "first question", "first answer").await;
    exchange(&db, &session.id, "second question", "second answer").await;

    let turns = SessionRepository::chat_history(db.pool(), &session.id, 1)
        .await
        .unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].user, "second question");
    assert_eq!(turns[0].assistant, "second answer");

    let all = SessionRepository::chat_history(db.pool(), &session.id, 10)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].user, "first question");
}

#[tokio::test]
async fn list_filters_by_user_and_counts_activity() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_temp_db(&dir).await;
    let pool = db.pool();
    let ns = db.namespace();

    let alice = SessionRepository::create(pool, ns, "Assist", Some("alice"), None)
        .await
        .unwrap();
    SessionRepository::create(pool, ns, "Assist", Some("bob"), None)
        .await
        .unwrap();
    exchange(&db, &alice.id, "hi", "hello").await;

    let all = SessionRepository::list(pool, ns, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let only_alice = SessionRepository::list(pool, ns, Some("alice")).await.unwrap();
    assert_eq!(only_alice.len(), 1);
    assert_eq!(only_alice[0].run_count, 1);
    assert_eq!(only_alice[0].message_count, 4);
}

#[tokio::test]
async fn deleting_a_session_removes_its_messages() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_temp_db(&dir).await;
    let session = SessionRepository::create(db.pool(), db.namespace(), "Assist", None, None)
        .await
        .unwrap();
    exchange(&db, &session.id, "q", "a").await;

    SessionRepository::delete(db.pool(), db.namespace(), &session.id)
        .await
        .unwrap();
    assert_eq!(
        SessionRepository::count_messages(db.pool(), &session.id)
            .await
            .unwrap(),
        0
    );
}
