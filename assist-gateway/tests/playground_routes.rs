mod common;

use std::sync::Arc;

use assist_gateway::agent::RunResponse;
use assist_gateway::server::create_router;
use assist_gateway::state::AppState;
use assist_db::SessionRepository;
use assist_gateway::tools::ToolManager;
use assist_knowledge::LoadReport;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use common::{ScriptedProvider, agent_settings, docs_knowledge, test_agent, text_response};

async fn app(provider: Arc<ScriptedProvider>) -> Router {
    let agent = test_agent(provider, ToolManager::empty(), agent_settings()).await;
    create_router(Arc::new(AppState::new(vec![agent])))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_and_status() {
    let app = app(ScriptedProvider::new(vec![])).await;

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    let response = app.oneshot(get("/v1/playground/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["playground"], "available");
}

#[tokio::test]
async fn agents_are_listed_with_their_slug() {
    let app = app(ScriptedProvider::new(vec![])).await;

    let response = app.oneshot(get("/v1/playground/agents")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let agents = json_body(response).await;
    assert_eq!(agents.as_array().unwrap().len(), 1);
    assert_eq!(agents[0]["id"], "assist");
    assert_eq!(agents[0]["model"], "scripted-model");
    assert_eq!(agents[0]["num_history_responses"], 3);
    assert_eq!(agents[0]["storage"]["namespace"], "test_sessions");
}

#[tokio::test]
async fn unknown_agent_is_404() {
    let app = app(ScriptedProvider::new(vec![])).await;

    let response = app
        .oneshot(post_json(
            "/v1/playground/agents/nobody/runs",
            json!({"message": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(
        json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("nobody")
    );
}

#[tokio::test]
async fn empty_message_is_400() {
    let app = app(ScriptedProvider::new(vec![])).await;

    let response = app
        .oneshot(post_json(
            "/v1/playground/agents/assist/runs",
            json!({"message": "  "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_from_another_namespace_is_404() {
    let provider = ScriptedProvider::new(vec![text_response("unused")]);
    let agent = test_agent(provider.clone(), ToolManager::empty(), agent_settings()).await;
    let foreign = SessionRepository::create(agent.sessions().pool(), "other_sessions", "Other", None, None)
        .await
        .unwrap();
    let app = create_router(Arc::new(AppState::new(vec![agent])));

    let response = app
        .oneshot(post_json(
            "/v1/playground/agents/assist/runs",
            json!({"message": "hello", "session_id": foreign.id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn session_lifecycle() {
    let provider = ScriptedProvider::new(vec![text_response("Hi! Ask me anything.")]);
    let app = app(provider).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/playground/agents/assist/runs",
            json!({"message": "hello", "user_id": "ada"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let run: RunResponse = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(run.content, "Hi! Ask me anything.");

    let response = app
        .clone()
        .oneshot(get("/v1/playground/agents/assist/sessions?user_id=ada"))
        .await
        .unwrap();
    let sessions = json_body(response).await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["id"], run.session_id.as_str());

    let response = app
        .clone()
        .oneshot(get("/v1/playground/agents/assist/sessions?user_id=someone-else"))
        .await
        .unwrap();
    assert!(json_body(response).await.as_array().unwrap().is_empty());

    let session_uri = format!("/v1/playground/agents/assist/sessions/{}", run.session_id);
    let response = app.clone().oneshot(get(&session_uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = json_body(response).await;
    assert_eq!(detail["id"], run.session_id.as_str());
    assert_eq!(detail["messages"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("{session_uri}/rename"),
            json!({"name": "Greetings"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["title"], "Greetings");

    let response = app
        .clone()
        .oneshot(post_json(&format!("{session_uri}/rename"), json!({"name": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.clone().oneshot(delete(&session_uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.clone().oneshot(get(&session_uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(delete(&session_uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn knowledge_load_needs_a_knowledge_base() {
    let app = app(ScriptedProvider::new(vec![])).await;

    let response = app
        .oneshot(post_json(
            "/v1/playground/agents/assist/knowledge/load",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn knowledge_load_reports_counts() {
    let dir = TempDir::new().unwrap();
    let knowledge = docs_knowledge(&dir).await;
    let agent = test_agent(
        ScriptedProvider::new(vec![]),
        ToolManager::empty(),
        agent_settings(),
    )
    .await
    .with_knowledge(knowledge);
    let app = create_router(Arc::new(AppState::new(vec![agent])));

    let response = app
        .clone()
        .oneshot(get("/v1/playground/agents"))
        .await
        .unwrap();
    let agents = json_body(response).await;
    assert_eq!(agents[0]["knowledge"]["collection"], "docs");
    assert_eq!(agents[0]["knowledge"]["search_type"], "keyword");

    let response = app
        .oneshot(post_json(
            "/v1/playground/agents/assist/knowledge/load",
            json!({"recreate": false}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report: LoadReport = serde_json::from_value(json_body(response).await).unwrap();
    assert_eq!(report.sources, 0);
    assert!(report.failed.is_empty());
}
