//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatRequest, ConversationListResponse, ConversationResponse, CreateConversationRequest,
    ErrorResponse, HideAlertsRequest, MessageResponse, PinRequest, ReactionRequest,
    RecipientsResponse, SendMessageRequest, SetActiveRequest, SetRecipientsRequest,
    SuccessResponse,
};
use super::AppState;
use crate::events::EventSink;
use crate::generation::{GeneratedReply, GenerationContext, GenerationError, HistoryLine};
use crate::scheduler::SchedulerError;
use crate::store::{MessageUpdate, Reaction, StoreError, USER_LABEL};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Conversation listing and creation
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/new", post(create_conversation))
        .route("/api/conversations/:id", get(get_conversation))
        // User actions
        .route("/api/conversations/:id/messages", post(send_message))
        .route(
            "/api/conversations/:id/messages/:message_id/reactions",
            post(toggle_reaction),
        )
        .route("/api/conversations/:id/recipients", post(set_recipients))
        .route("/api/conversations/:id/hide-alerts", post(set_hide_alerts))
        .route("/api/conversations/:id/pin", post(set_pinned))
        .route("/api/conversations/:id/delete", post(delete_conversation))
        // Which conversation the user is looking at
        .route("/api/active", post(set_active))
        // Engine events
        .route("/api/stream", get(stream_events))
        // Stateless generation
        .route("/api/chat", post(chat))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(State(state): State<AppState>) -> Json<ConversationListResponse> {
    Json(ConversationListResponse {
        conversations: state.scheduler.store().list(),
        active_conversation_id: state.scheduler.tracker().active(),
    })
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state
        .scheduler
        .start_conversation(&req.recipients, req.message.as_deref())
        .await?;
    tracing::info!(
        conv_id = %conversation.id,
        recipients = ?req.recipients,
        "Conversation created"
    );
    Ok(Json(ConversationResponse {
        conversation,
        typing: None,
    }))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state.scheduler.store().get(&id)?;
    let typing = state
        .scheduler
        .state(&id)
        .await
        .and_then(|s| s.in_flight().map(|task| task.speaker.clone()));
    Ok(Json(ConversationResponse {
        conversation,
        typing,
    }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.scheduler.delete_conversation(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// User Actions
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::BadRequest("Message content is empty".to_string()));
    }
    let message = state
        .scheduler
        .send_user_message(&id, &req.content, req.html_content)
        .await?;
    Ok(Json(MessageResponse { message }))
}

async fn toggle_reaction(
    State(state): State<AppState>,
    Path((id, message_id)): Path<(String, String)>,
    Json(req): Json<ReactionRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message = state.scheduler.store().toggle_reaction(
        &id,
        &message_id,
        Reaction::new(req.kind, USER_LABEL),
    )?;
    state.events.on_message_updated(
        &id,
        &message_id,
        &MessageUpdate {
            reactions: message.reactions.clone(),
        },
    );
    Ok(Json(MessageResponse { message }))
}

async fn set_recipients(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetRecipientsRequest>,
) -> Result<Json<RecipientsResponse>, AppError> {
    let change = state.scheduler.set_recipients(&id, &req.recipients).await?;
    Ok(Json(RecipientsResponse {
        added: change.added,
        removed: change.removed,
        notices: change.notices,
    }))
}

async fn set_hide_alerts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<HideAlertsRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .scheduler
        .store()
        .set_hide_alerts(&id, req.hide_alerts)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn set_pinned(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PinRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.scheduler.store().set_pinned(&id, req.pinned)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn set_active(
    State(state): State<AppState>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.scheduler.set_active_conversation(req.conversation_id)?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_events(State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before the snapshot so nothing falls between the two
    let broadcast_rx = state.events.subscribe();
    let init = json!({
        "type": "init",
        "conversations": state.scheduler.store().list(),
        "active_conversation_id": state.scheduler.tracker().active(),
    });
    sse_stream(init, broadcast_rx)
}

// ============================================================
// Stateless Chat
// ============================================================

/// Generate the next message for a client-held conversation.
///
/// Whoever sent the last message is not eligible to speak next.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<GeneratedReply>, AppError> {
    if req.recipients.is_empty() {
        return Err(AppError::BadRequest("No recipients given".to_string()));
    }
    let participants: Vec<String> = req.recipients.into_iter().map(|r| r.name).collect();
    let last_sender = req.messages.last().map(|m| m.sender.clone());
    let candidates: Vec<String> = participants
        .iter()
        .filter(|name| Some(*name) != last_sender.as_ref())
        .cloned()
        .collect();

    let context = GenerationContext {
        participants,
        history: req
            .messages
            .into_iter()
            .map(|m| HistoryLine::new(m.sender, m.content))
            .collect(),
    };

    tracing::info!(
        history = context.history.len(),
        candidates = ?candidates,
        "Stateless chat request"
    );
    let reply = state
        .generator
        .generate_reply(&context, &candidates)
        .await?;
    Ok(Json(reply))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("dialogue-engine ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    /// The generation backend failed or answered unusably
    BadGateway(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConversationNotFound(_) | StoreError::MessageNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            StoreError::ConversationExists(_) => AppError::Internal(e.to_string()),
            StoreError::NoRecipients
            | StoreError::DuplicateRecipient(_)
            | StoreError::ReservedName(_)
            | StoreError::NotARecipient(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<SchedulerError> for AppError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Store(e) => e.into(),
            SchedulerError::RuntimeStopped(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::NoCandidates => AppError::BadRequest(e.to_string()),
            _ => AppError::BadGateway(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
