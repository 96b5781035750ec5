//! Effects produced by state transitions

use super::state::GenerationTask;
use crate::generation::{GeneratedReply, GenerationError};

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Consult the turn selector; yields `TurnPlanned` or `ChainEnded`.
    /// `answer_trigger` opens a fresh turn instead of continuing a chain.
    PlanTurn { answer_trigger: bool },

    /// Dispatch a generation (spawns as background task)
    RequestGeneration { task: GenerationTask },

    /// Abort a running generation whose result is no longer wanted
    CancelGeneration { task_id: String },

    /// Append a reply, subject to the discard-on-completion guard
    AppendGenerated {
        task: GenerationTask,
        reply: GeneratedReply,
    },

    /// Publish the typing indicator (`None` clears it)
    SetTyping { speaker: Option<String> },

    /// Publish a terminal generation failure
    ReportError {
        task: GenerationTask,
        error: GenerationError,
    },

    /// Stop the runtime
    Halt,
}

impl Effect {
    pub fn typing(speaker: impl Into<String>) -> Self {
        Effect::SetTyping {
            speaker: Some(speaker.into()),
        }
    }

    pub fn clear_typing() -> Self {
        Effect::SetTyping { speaker: None }
    }

    pub fn answer_trigger() -> Self {
        Effect::PlanTurn {
            answer_trigger: true,
        }
    }

    pub fn cancel(task: &GenerationTask) -> Self {
        Effect::CancelGeneration {
            task_id: task.id.clone(),
        }
    }
}
