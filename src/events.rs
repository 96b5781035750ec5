//! Outbound notifications to the UI layer

use crate::generation::GenerationError;
use crate::store::{Message, MessageUpdate};
use serde::Serialize;
use tokio::sync::broadcast;

/// A generation that ended without a message
#[derive(Debug, Clone, Serialize)]
pub struct GenerationFailure {
    pub conversation_id: String,
    /// Speaker the failed task was generating for
    pub speaker: String,
    pub error: GenerationError,
}

/// Callbacks the scheduler pushes results through
pub trait EventSink: Send + Sync {
    fn on_message_generated(&self, conversation_id: &str, message: &Message);

    fn on_message_updated(&self, conversation_id: &str, message_id: &str, update: &MessageUpdate);

    /// `recipient` is `None` when typing stops
    fn on_typing_status_changed(&self, conversation_id: Option<&str>, recipient: Option<&str>);

    fn on_error(&self, failure: &GenerationFailure);
}

/// Hook invoked when a generated message bumps the unread count
pub trait NotificationSound: Send + Sync {
    fn play(&self, conversation_id: &str);
}

/// Sound hook that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl NotificationSound for Silent {
    fn play(&self, _conversation_id: &str) {}
}

/// Engine events as sent to stream subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    MessageGenerated {
        conversation_id: String,
        message: Message,
    },
    MessageUpdated {
        conversation_id: String,
        message_id: String,
        update: MessageUpdate,
    },
    TypingStatus {
        conversation_id: Option<String>,
        recipient: Option<String>,
    },
    Error {
        #[serde(flatten)]
        failure: GenerationFailure,
    },
    /// The client should play its notification sound
    Notification { conversation_id: String },
}

impl EngineEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageGenerated { .. } => "message_generated",
            Self::MessageUpdated { .. } => "message_updated",
            Self::TypingStatus { .. } => "typing_status",
            Self::Error { .. } => "error",
            Self::Notification { .. } => "notification",
        }
    }
}

/// Sink that fans events out over a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl EventSink for BroadcastSink {
    fn on_message_generated(&self, conversation_id: &str, message: &Message) {
        self.send(EngineEvent::MessageGenerated {
            conversation_id: conversation_id.to_string(),
            message: message.clone(),
        });
    }

    fn on_message_updated(&self, conversation_id: &str, message_id: &str, update: &MessageUpdate) {
        self.send(EngineEvent::MessageUpdated {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            update: update.clone(),
        });
    }

    fn on_typing_status_changed(&self, conversation_id: Option<&str>, recipient: Option<&str>) {
        self.send(EngineEvent::TypingStatus {
            conversation_id: conversation_id.map(ToString::to_string),
            recipient: recipient.map(ToString::to_string),
        });
    }

    fn on_error(&self, failure: &GenerationFailure) {
        self.send(EngineEvent::Error {
            failure: failure.clone(),
        });
    }
}

impl NotificationSound for BroadcastSink {
    fn play(&self, conversation_id: &str) {
        self.send(EngineEvent::Notification {
            conversation_id: conversation_id.to_string(),
        });
    }
}
