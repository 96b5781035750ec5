//! Scheduler state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Regenerations allowed after a validation failure
pub const MAX_REGENERATIONS: u32 = 1;

/// What asked the scheduler to consider a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    UserMessage { message_id: String },
    ConversationCreated,
}

/// One generation the scheduler is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: String,
    pub conversation_id: String,
    /// Last message in the conversation when the task was planned
    pub anchor_message_id: Option<String>,
    pub speaker: String,
    /// Names the backend may answer as; planned turns carry only `speaker`
    pub candidates: Vec<String>,
    /// 1 for the first request, +1 per regeneration
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

impl GenerationTask {
    /// Same task, next attempt
    #[must_use]
    pub fn regenerate(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }

    pub fn can_regenerate(&self) -> bool {
        self.attempt <= MAX_REGENERATIONS
    }
}

/// Per-conversation scheduler state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// Nothing in flight
    #[default]
    Idle,

    /// One generation in flight. A trigger that arrives meanwhile is held
    /// here (newest wins) and handled once the task resolves.
    AwaitingGeneration {
        task: GenerationTask,
        pending_trigger: Option<Trigger>,
    },

    /// Conversation deleted; accepts nothing further
    Stopped,
}

impl ConvState {
    pub fn in_flight(&self) -> Option<&GenerationTask> {
        match self {
            ConvState::AwaitingGeneration { task, .. } => Some(task),
            _ => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ConvState::Stopped)
    }
}

/// Fixed facts about the conversation a state machine runs for
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub conversation_id: String,
}

impl ConvContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
        }
    }
}
