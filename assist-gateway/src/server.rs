use std::sync::Arc;

use assist_db::{DbError, Message, Session, SessionInfo, SessionRepository};
use assist_knowledge::{KnowledgeError, LoadReport};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::agent::{Agent, AgentError, AgentInfo, RunRequest, RunResponse};
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct PlaygroundStatus {
    pub playground: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionListQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadRequest {
    #[serde(default)]
    pub recreate: bool,
}

/// A session with its full message log
#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub messages: Vec<Message>,
}

/// Failure of a playground request, rendered as `{error}` JSON
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(message) => {
                error!(error = %message, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::SessionNotFound(id) => ApiError::NotFound(format!("Session not found: {}", id)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::EmptyMessage => ApiError::BadRequest(e.to_string()),
            AgentError::Database(db) => db.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<KnowledgeError> for ApiError {
    fn from(e: KnowledgeError) -> Self {
        match e {
            KnowledgeError::InvalidSource(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/playground/status", get(status_handler))
        .route("/v1/playground/agents", get(agents_handler))
        .route("/v1/playground/agents/{agent_id}/runs", post(run_handler))
        .route(
            "/v1/playground/agents/{agent_id}/sessions",
            get(list_sessions_handler),
        )
        .route(
            "/v1/playground/agents/{agent_id}/sessions/{session_id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route(
            "/v1/playground/agents/{agent_id}/sessions/{session_id}/rename",
            post(rename_session_handler),
        )
        .route(
            "/v1/playground/agents/{agent_id}/knowledge/load",
            post(load_knowledge_handler),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn find_agent(state: &AppState, agent_id: &str) -> Result<Arc<Agent>, ApiError> {
    state
        .agent(agent_id)
        .ok_or_else(|| ApiError::NotFound(format!("Agent not found: {}", agent_id)))
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn status_handler() -> impl IntoResponse {
    Json(PlaygroundStatus {
        playground: "available".to_string(),
    })
}

async fn agents_handler(State(state): State<Arc<AppState>>) -> Json<Vec<AgentInfo>> {
    Json(state.agent_infos())
}

/// POST /v1/playground/agents/{agent_id}/runs
async fn run_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(request): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let agent = find_agent(&state, &agent_id)?;
    info!(agent = %agent_id, session_id = ?request.session_id, "run requested");
    let response = agent.run(request).await?;
    Ok(Json(response))
}

async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<SessionInfo>>, ApiError> {
    let agent = find_agent(&state, &agent_id)?;
    let sessions = agent.sessions();
    let list =
        SessionRepository::list(sessions.pool(), sessions.namespace(), query.user_id.as_deref())
            .await?;
    Ok(Json(list))
}

async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Path((agent_id, session_id)): Path<(String, String)>,
) -> Result<Json<SessionDetail>, ApiError> {
    let agent = find_agent(&state, &agent_id)?;
    let sessions = agent.sessions();
    let session = SessionRepository::get_by_id(sessions.pool(), sessions.namespace(), &session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;
    let messages = SessionRepository::list_messages(sessions.pool(), &session.id).await?;
    Ok(Json(SessionDetail { session, messages }))
}

async fn rename_session_handler(
    State(state): State<Arc<AppState>>,
    Path((agent_id, session_id)): Path<(String, String)>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<Session>, ApiError> {
    let agent = find_agent(&state, &agent_id)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Session name must not be empty".to_string()));
    }
    let sessions = agent.sessions();
    let session =
        SessionRepository::rename(sessions.pool(), sessions.namespace(), &session_id, name).await?;
    Ok(Json(session))
}

async fn delete_session_handler(
    State(state): State<Arc<AppState>>,
    Path((agent_id, session_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let agent = find_agent(&state, &agent_id)?;
    let sessions = agent.sessions();
    SessionRepository::delete(sessions.pool(), sessions.namespace(), &session_id).await?;
    info!(agent = %agent_id, session_id = %session_id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/playground/agents/{agent_id}/knowledge/load
async fn load_knowledge_handler(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    request: Option<Json<LoadRequest>>,
) -> Result<Json<LoadReport>, ApiError> {
    let agent = find_agent(&state, &agent_id)?;
    let knowledge = agent
        .knowledge()
        .ok_or_else(|| ApiError::BadRequest("Agent has no knowledge base".to_string()))?;
    let recreate = request.map(|Json(body)| body.recreate).unwrap_or_default();
    let report = knowledge.load(recreate).await?;
    Ok(Json(report))
}
