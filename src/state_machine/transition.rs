//! Pure state transition function

use super::state::{GenerationTask, Trigger};
use super::{ConvContext, ConvState, Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Conversation is stopped")]
    Stopped,
    #[error("Result for task {0} is no longer wanted")]
    StaleTask(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl TransitionError {
    /// Expected under normal operation; not worth surfacing
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Stopped | Self::StaleTask(_))
    }
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs and performs
/// no I/O. Randomness and ids come in through events built by the executor.
pub fn transition(
    state: &ConvState,
    _context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (ConvState::Stopped, _) => Err(TransitionError::Stopped),

        // ============================================================
        // Triggers
        // ============================================================

        (ConvState::Idle, Event::Trigger { .. }) => {
            Ok(TransitionResult::new(ConvState::Idle).with_effect(Effect::answer_trigger()))
        }

        // Never supersede the task in flight; remember only the newest
        (ConvState::AwaitingGeneration { task, .. }, Event::Trigger { trigger }) => {
            Ok(TransitionResult::new(ConvState::AwaitingGeneration {
                task: task.clone(),
                pending_trigger: Some(trigger),
            }))
        }

        // ============================================================
        // Planning
        // ============================================================

        (ConvState::Idle, Event::TurnPlanned { task }) => {
            let speaker = task.speaker.clone();
            Ok(TransitionResult::new(ConvState::AwaitingGeneration {
                task: task.clone(),
                pending_trigger: None,
            })
            .with_effect(Effect::typing(speaker))
            .with_effect(Effect::RequestGeneration { task }))
        }

        (ConvState::Idle, Event::ChainEnded) => Ok(TransitionResult::new(ConvState::Idle)),

        (ConvState::AwaitingGeneration { .. }, Event::TurnPlanned { .. } | Event::ChainEnded) => {
            Err(TransitionError::InvalidTransition(
                "turn planned while a generation is in flight".to_string(),
            ))
        }

        // ============================================================
        // Generation results
        // ============================================================

        // A trigger that arrived meanwhile gets its own answer; otherwise the
        // chain may continue
        (
            ConvState::AwaitingGeneration {
                task,
                pending_trigger,
            },
            Event::GenerationSucceeded { task_id, reply },
        ) if task.id == task_id => Ok(TransitionResult::new(ConvState::Idle)
            .with_effect(Effect::AppendGenerated {
                task: task.clone(),
                reply,
            })
            .with_effect(Effect::clear_typing())
            .with_effect(Effect::PlanTurn {
                answer_trigger: pending_trigger.is_some(),
            })),

        (
            ConvState::AwaitingGeneration {
                task,
                pending_trigger,
            },
            Event::GenerationFailed { task_id, error },
        ) if task.id == task_id => {
            if error.is_validation() && task.can_regenerate() {
                let retry = task.regenerate();
                return Ok(TransitionResult::new(ConvState::AwaitingGeneration {
                    task: retry.clone(),
                    pending_trigger: pending_trigger.clone(),
                })
                .with_effect(Effect::RequestGeneration { task: retry }));
            }
            Ok(TransitionResult::new(ConvState::Idle)
                .with_effect(Effect::clear_typing())
                .with_effect(Effect::ReportError {
                    task: task.clone(),
                    error,
                })
                .with_effects(replan_if_pending(pending_trigger.as_ref())))
        }

        (
            ConvState::AwaitingGeneration {
                task,
                pending_trigger,
            },
            Event::TaskInvalidated { task_id },
        ) if task.id == task_id => Ok(TransitionResult::new(ConvState::Idle)
            .with_effect(Effect::clear_typing())
            .with_effects(replan_if_pending(pending_trigger.as_ref()))),

        (
            _,
            Event::GenerationSucceeded { task_id, .. }
            | Event::GenerationFailed { task_id, .. }
            | Event::TaskInvalidated { task_id },
        ) => Err(TransitionError::StaleTask(task_id)),

        // ============================================================
        // Membership & lifecycle
        // ============================================================

        (ConvState::Idle, Event::RecipientsChanged { .. }) => {
            Ok(TransitionResult::new(ConvState::Idle))
        }

        (
            ConvState::AwaitingGeneration {
                task,
                pending_trigger,
            },
            Event::RecipientsChanged { recipients },
        ) => {
            if recipients.contains(&task.speaker) {
                Ok(TransitionResult::new(ConvState::AwaitingGeneration {
                    task: narrow_candidates(task, &recipients),
                    pending_trigger: pending_trigger.clone(),
                }))
            } else {
                // Speaker removed: drop the task and pick someone else
                Ok(TransitionResult::new(ConvState::Idle)
                    .with_effect(Effect::cancel(task))
                    .with_effect(Effect::clear_typing())
                    .with_effect(Effect::PlanTurn {
                        answer_trigger: pending_trigger.is_some(),
                    }))
            }
        }

        (ConvState::Idle, Event::ConversationDeleted) => {
            Ok(TransitionResult::new(ConvState::Stopped).with_effect(Effect::Halt))
        }

        (ConvState::AwaitingGeneration { task, .. }, Event::ConversationDeleted) => {
            Ok(TransitionResult::new(ConvState::Stopped)
                .with_effect(Effect::cancel(task))
                .with_effect(Effect::clear_typing())
                .with_effect(Effect::Halt))
        }
    }
}

fn replan_if_pending(pending: Option<&Trigger>) -> Option<Effect> {
    pending.map(|_| Effect::answer_trigger())
}

fn narrow_candidates(task: &GenerationTask, recipients: &[String]) -> GenerationTask {
    GenerationTask {
        candidates: task
            .candidates
            .iter()
            .filter(|c| recipients.contains(c))
            .cloned()
            .collect(),
        ..task.clone()
    }
}
