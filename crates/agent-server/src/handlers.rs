//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use agent_core::history::{StoredConversation, StoredMessage};
use agent_core::{AgentError, ProgressEvent, SessionId, SharedSession, ToolResult, spawn_turn};
use research_agents::AgentMode;
use research_agents::search::SearchRequest;
use research_agents::svckit::DeepSearchOptions;

use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 50;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub search_configured: bool,
    pub mode: String,
    pub active_sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// `multi` or `single`; only applies when the session is created
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub status: &'static str,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationStatus {
    pub status: &'static str,
    pub conversation_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    /// `basic` or `deep`
    #[serde(default = "default_search_type")]
    pub search_type: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_search_type() -> String {
    "basic".into()
}

const fn default_max_results() -> u32 {
    5
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Conversation not found")]
    ConversationNotFound,

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound | Self::ConversationNotFound => StatusCode::NOT_FOUND,
            Self::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            Self::Agent(_) => "AGENT_ERROR",
        }
    }

    fn body(&self) -> ErrorResponse {
        let error = match self {
            Self::Agent(e) => e.user_message(),
            other => other.to_string(),
        };
        ErrorResponse {
            error,
            code: self.code().into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Agent(e) = &self {
            tracing::error!("Agent error: {}", e);
        }
        (self.status(), Json(self.body())).into_response()
    }
}

/// Validate a chat request, returning the session id and requested mode
fn prepare(
    request: &ChatRequest,
    fallback_id: impl FnOnce() -> SessionId,
) -> Result<(SessionId, Option<AgentMode>), ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::InvalidRequest("Message must not be empty".into()));
    }

    let mode = request
        .mode
        .as_deref()
        .map(str::parse::<AgentMode>)
        .transpose()
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let id = request
        .session_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map_or_else(fallback_id, SessionId::from_string);

    Ok((id, mode))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.factory.provider();
    let provider_connected = provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: provider.kind().to_string(),
        provider_connected,
        search_configured: state.factory.search_configured(),
        mode: state.factory.config().mode.to_string(),
        active_sessions: state.sessions.len().await,
    })
}

/// Main chat endpoint (non-streaming)
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (id, mode) = prepare(&payload, SessionId::new)?;

    let session = state.session(&id, mode).await?;
    let message = final_answer(session, payload.message).await;

    Ok(Json(ChatResponse {
        message,
        session_id: id.to_string(),
    }))
}

/// Answer of a turn that keeps running if this request is dropped
async fn final_answer(session: SharedSession, message: String) -> String {
    let mut events = spawn_turn(session, message);
    while let Some(event) = events.next().await {
        if let ProgressEvent::Response { content } = event {
            return content;
        }
    }
    String::new()
}

/// WebSocket streaming chat.
///
/// Each text frame is a [`ChatRequest`]; the turn's progress events are sent
/// back as JSON frames. Requests without a session id share one session per socket.
pub async fn chat_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn send_error(sender: &mut futures::stream::SplitSink<WebSocket, Message>, error: &ApiError) -> bool {
    let body = error.body();
    let frame = serde_json::json!({"type": "error", "error": body.error, "code": body.code});
    sender.send(Message::Text(frame.to_string().into())).await.is_ok()
}

async fn handle_stream(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let socket_session = SessionId::new();

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let request: ChatRequest = match serde_json::from_str(&msg) {
            Ok(r) => r,
            Err(e) => {
                if !send_error(&mut sender, &ApiError::InvalidRequest(e.to_string())).await {
                    break;
                }
                continue;
            }
        };

        let session = match prepare(&request, || socket_session.clone()) {
            Ok((id, mode)) => state.session(&id, mode).await.map_err(ApiError::from),
            Err(e) => Err(e),
        };
        let session = match session {
            Ok(session) => session,
            Err(e) => {
                if !send_error(&mut sender, &e).await {
                    break;
                }
                continue;
            }
        };

        // A disconnect stops the frames, not the turn
        let mut events = spawn_turn(session, request.message);
        while let Some(event) = events.next().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Dropping unserializable event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(frame.into())).await.is_err() {
                tracing::debug!("Client went away mid-turn");
                return;
            }
        }
    }
}

/// Clear a session's conversation
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    if !state.sessions.reset(&SessionId::from_string(session_id.as_str())).await {
        return Err(ApiError::SessionNotFound);
    }
    Ok(Json(SessionStatus {
        status: "reset",
        session_id,
    }))
}

/// Drop a live session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    if !state.sessions.remove(&SessionId::from_string(session_id.as_str())).await {
        return Err(ApiError::SessionNotFound);
    }
    Ok(Json(SessionStatus {
        status: "deleted",
        session_id,
    }))
}

/// Stored conversations, most recent first
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<StoredConversation>>, ApiError> {
    let conversations = state
        .storage
        .list_conversations(page.limit.unwrap_or(DEFAULT_PAGE_SIZE), page.offset.unwrap_or(0))
        .await?;
    Ok(Json(conversations))
}

pub async fn conversation_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    if state.storage.get_conversation(&conversation_id).await?.is_none() {
        return Err(ApiError::ConversationNotFound);
    }
    let messages = state.storage.get_messages(&conversation_id, page.limit).await?;
    Ok(Json(messages))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationStatus>, ApiError> {
    if !state.storage.delete_conversation(&conversation_id).await? {
        return Err(ApiError::ConversationNotFound);
    }
    Ok(Json(ConversationStatus {
        status: "deleted",
        conversation_id,
    }))
}

/// Direct search without a conversation
pub async fn search_handler(
    State(state): State<AppState>,
    Json(payload): Json<SearchBody>,
) -> Result<Json<ToolResult<Value>>, ApiError> {
    let result = match payload.search_type.as_str() {
        "basic" => state
            .factory
            .search(&SearchRequest::new(payload.query).max_results(payload.max_results.clamp(1, 20)))
            .await
            .map(|response| serde_json::to_value(response).unwrap_or(Value::Null)),
        "deep" => state
            .factory
            .deep_search(&payload.query, &DeepSearchOptions::default())
            .await
            .map(|research| serde_json::to_value(research).unwrap_or(Value::Null)),
        other => {
            return Err(ApiError::InvalidRequest(format!(
                "Unknown search_type: {other} (expected basic or deep)"
            )));
        }
    };

    Ok(Json(result))
}
