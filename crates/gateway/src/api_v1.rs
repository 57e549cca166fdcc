//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`                               — send a message, SSE stream of turn events
//! - `GET    /v1/tools`                              — tool definitions
//! - `GET    /v1/conversations`                      — summaries, newest first
//! - `POST   /v1/conversations`                      — create an empty conversation
//! - `GET    /v1/conversations/{id}`                 — full conversation
//! - `DELETE /v1/conversations/{id}`                 — delete a conversation
//! - `GET    /v1/conversations/{id}/transcript`      — display view with folded tool results
//! - `POST   /v1/conversations/{id}/interrupt`       — signal the active turn
//! - `POST   /v1/conversations/{id}/delete-last`     — drop the last exchange
//! - `POST   /v1/conversations/{id}/regenerate`      — re-run the last exchange, SSE stream

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

use toolweave_core::message::{Conversation, ConversationId};
use toolweave_core::provider::ToolDefinition;
use toolweave_core::error::StoreError;
use toolweave_core::store::ConversationSummary;
use toolweave_engine::{Attachment, ChatService, ServiceError, TranscriptEntry, TurnHandle};

// ── State ─────────────────────────────────────────────────────────────────

pub struct ApiV1State {
    pub service: ChatService,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl ApiV1State {
    pub fn new(service: ChatService) -> Self {
        Self {
            service,
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/tools", get(list_tools_handler))
        .route(
            "/conversations",
            get(list_conversations_handler).post(create_conversation_handler),
        )
        .route(
            "/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
        .route("/conversations/{id}/transcript", get(transcript_handler))
        .route("/conversations/{id}/interrupt", post(interrupt_handler))
        .route("/conversations/{id}/delete-last", post(delete_last_handler))
        .route("/conversations/{id}/regenerate", post(regenerate_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    /// Existing conversation ID (omit to create new).
    #[serde(default)]
    conversation_id: Option<String>,
    /// The user's message.
    message: String,
    /// Optional attached file.
    #[serde(default)]
    file: Option<Attachment>,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDefinition>,
    pub count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Serialize, Deserialize)]
pub struct CreateConversationResponse {
    pub id: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize)]
pub struct InterruptResponse {
    pub interrupted: bool,
}

#[derive(Serialize, Deserialize)]
pub struct DeleteLastResponse {
    pub id: String,
    pub message_count: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatusResponse {
    pub provider: String,
    pub model: String,
    pub store: String,
    pub tools: usize,
    pub uptime_secs: i64,
}

// ── Errors ────────────────────────────────────────────────────────────────

/// A `ServiceError` rendered as a JSON `{error}` body.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Busy(_) => StatusCode::CONFLICT,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::NothingToRegenerate(_)
            | ServiceError::NothingToDelete(_)
            | ServiceError::EmptyMessage
            | ServiceError::Store(StoreError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Store(_) | ServiceError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── SSE ───────────────────────────────────────────────────────────────────

/// Forward a turn's events as SSE. The stream ends after the terminal event.
///
/// Dropping the response does not stop the turn; it still completes and saves.
fn sse_response(handle: TurnHandle) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = UnboundedReceiverStream::new(handle.events).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /v1/chat`
async fn chat_handler(State(state): State<SharedApiState>, Json(payload): Json<ChatRequest>) -> ApiResult<Response> {
    let conversation_id = payload
        .conversation_id
        .filter(|id| !id.is_empty())
        .map(ConversationId);
    info!(
        conversation_id = conversation_id.as_ref().map(ConversationId::as_str).unwrap_or("new"),
        has_file = payload.file.is_some(),
        "v1/chat request"
    );

    let handle = state
        .service
        .send_message(conversation_id, &payload.message, payload.file)
        .await?;
    Ok(sse_response(handle).into_response())
}

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let tools = state.service.tool_definitions();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

async fn list_conversations_handler(State(state): State<SharedApiState>) -> ApiResult<Json<ConversationListResponse>> {
    let conversations = state.service.list().await?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn create_conversation_handler(
    State(state): State<SharedApiState>,
) -> ApiResult<(StatusCode, Json<CreateConversationResponse>)> {
    let conversation = state.service.new_conversation().await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            id: conversation.id.to_string(),
            created_at: conversation.created_at.to_rfc3339(),
        }),
    ))
}

async fn get_conversation_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.service.get(&ConversationId(id)).await?))
}

async fn delete_conversation_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service.delete(&ConversationId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn transcript_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TranscriptEntry>>> {
    Ok(Json(state.service.transcript(&ConversationId(id)).await?))
}

async fn interrupt_handler(State(state): State<SharedApiState>, Path(id): Path<String>) -> Json<InterruptResponse> {
    let interrupted = state.service.interrupt(&ConversationId(id));
    Json(InterruptResponse { interrupted })
}

async fn delete_last_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteLastResponse>> {
    let conversation = state.service.delete_last(&ConversationId(id)).await?;
    Ok(Json(DeleteLastResponse {
        id: conversation.id.to_string(),
        message_count: conversation.messages.len(),
    }))
}

async fn regenerate_handler(State(state): State<SharedApiState>, Path(id): Path<String>) -> ApiResult<Response> {
    let handle = state.service.regenerate(&ConversationId(id)).await?;
    Ok(sse_response(handle).into_response())
}

async fn status_handler(State(state): State<SharedApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        provider: state.service.provider_name().to_string(),
        model: state.service.model().to_string(),
        store: state.service.store_name().to_string(),
        tools: state.service.tool_definitions().len(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}
