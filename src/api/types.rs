//! API request and response types

use crate::store::{Conversation, Message, ReactionType};
use serde::{Deserialize, Serialize};

/// Request to create a new conversation
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub recipients: Vec<String>,
    /// Optional first message from the user
    #[serde(default)]
    pub message: Option<String>,
}

/// Request to send a user message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub html_content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRecipientsRequest {
    pub recipients: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HideAlertsRequest {
    pub hide_alerts: bool,
}

#[derive(Debug, Deserialize)]
pub struct PinRequest {
    pub pinned: bool,
}

/// Toggle the user's reaction on a message
#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    #[serde(rename = "type")]
    pub kind: ReactionType,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub conversation_id: Option<String>,
}

/// Response with a list of conversations
#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<Conversation>,
    pub active_conversation_id: Option<String>,
}

/// Response with a single conversation
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
    /// Recipient currently being generated for, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typing: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct RecipientsResponse {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// System notices appended for the change
    pub notices: Vec<Message>,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// One history entry for the stateless chat endpoint
#[derive(Debug, Deserialize)]
pub struct ChatHistoryEntry {
    pub sender: String,
    pub content: String,
}

/// A participant as the client describes it; only the name matters here
#[derive(Debug, Deserialize)]
pub struct ChatRecipient {
    pub name: String,
}

/// Stateless generation request: participants and history in, one reply out
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub recipients: Vec<ChatRecipient>,
    #[serde(default)]
    pub messages: Vec<ChatHistoryEntry>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
