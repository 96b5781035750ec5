//! Events that can occur in a conversation

use super::state::{GenerationTask, Trigger};
use crate::generation::{GeneratedReply, GenerationError};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Collaborator events
    Trigger {
        trigger: Trigger,
    },
    RecipientsChanged {
        recipients: Vec<String>,
    },
    ConversationDeleted,

    // Planning events (produced by the executor)
    TurnPlanned {
        task: GenerationTask,
    },
    ChainEnded,

    // Generation events
    GenerationSucceeded {
        task_id: String,
        reply: GeneratedReply,
    },
    GenerationFailed {
        task_id: String,
        error: GenerationError,
    },
    /// The task could not be dispatched (no candidates left)
    TaskInvalidated {
        task_id: String,
    },
}
