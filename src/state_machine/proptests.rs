//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::generation::{GeneratedReply, GenerationError};
use crate::llm::LlmErrorKind;
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new("test-conv")
}

fn make_task(id: String, speaker: String, attempt: u32) -> GenerationTask {
    GenerationTask {
        id,
        conversation_id: "test-conv".to_string(),
        anchor_message_id: None,
        speaker,
        candidates: vec!["A".to_string(), "B".to_string(), "C".to_string()],
        attempt,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_speaker() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["A", "B", "C"]).prop_map(ToString::to_string)
}

fn arb_task_id() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["t1", "t2", "t3"]).prop_map(ToString::to_string)
}

fn arb_task() -> impl Strategy<Value = GenerationTask> {
    (arb_task_id(), arb_speaker(), 1u32..3).prop_map(|(id, speaker, attempt)| make_task(id, speaker, attempt))
}

fn arb_trigger() -> impl Strategy<Value = Trigger> {
    prop_oneof![
        "[a-z]{4}".prop_map(|message_id| Trigger::UserMessage { message_id }),
        Just(Trigger::ConversationCreated),
    ]
}

fn arb_error() -> impl Strategy<Value = GenerationError> {
    prop_oneof![
        Just(GenerationError::Transport {
            kind: LlmErrorKind::Network,
            message: "down".to_string(),
            attempts: 3,
        }),
        Just(GenerationError::MalformedResponse {
            raw: "???".to_string()
        }),
        arb_speaker().prop_map(|sender| GenerationError::InvalidSender {
            sender,
            candidates: vec!["A".to_string()],
        }),
        Just(GenerationError::NoCandidates),
    ]
}

fn arb_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        Just(ConvState::Idle),
        (arb_task(), prop::option::of(arb_trigger())).prop_map(|(task, pending_trigger)| {
            ConvState::AwaitingGeneration {
                task,
                pending_trigger,
            }
        }),
        Just(ConvState::Stopped),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_trigger().prop_map(|trigger| Event::Trigger { trigger }),
        arb_task().prop_map(|task| Event::TurnPlanned { task }),
        Just(Event::ChainEnded),
        (arb_task_id(), arb_speaker(), "[a-z ]{1,20}").prop_map(|(task_id, speaker, content)| {
            Event::GenerationSucceeded {
                task_id,
                reply: GeneratedReply { speaker, content },
            }
        }),
        (arb_task_id(), arb_error())
            .prop_map(|(task_id, error)| Event::GenerationFailed { task_id, error }),
        arb_task_id().prop_map(|task_id| Event::TaskInvalidated { task_id }),
        prop::sample::subsequence(vec!["A", "B", "C"], 1..=3).prop_map(|names| {
            Event::RecipientsChanged {
                recipients: names.into_iter().map(ToString::to_string).collect(),
            }
        }),
        Just(Event::ConversationDeleted),
    ]
}

fn count_dispatches(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::RequestGeneration { .. }))
        .count()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Stopped is absorbing
    #[test]
    fn stopped_accepts_nothing(event in arb_event()) {
        let result = transition(&ConvState::Stopped, &test_context(), event);
        prop_assert_eq!(result.unwrap_err(), TransitionError::Stopped);
    }

    /// A dispatch only ever happens on entry into AwaitingGeneration, so at
    /// most one task is in flight.
    #[test]
    fn at_most_one_in_flight(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            let dispatches = count_dispatches(&result.effects);
            prop_assert!(dispatches <= 1);
            if dispatches == 1 {
                let in_flight = result.new_state.in_flight();
                prop_assert!(in_flight.is_some());
                let dispatched = result.effects.iter().find_map(|e| match e {
                    Effect::RequestGeneration { task } => Some(task),
                    _ => None,
                });
                prop_assert_eq!(in_flight, dispatched);
            }
        }
    }

    /// Triggers never supersede the in-flight task
    #[test]
    fn trigger_while_awaiting_keeps_task(task in arb_task(), trigger in arb_trigger()) {
        let state = ConvState::AwaitingGeneration { task: task.clone(), pending_trigger: None };
        let result = transition(&state, &test_context(), Event::Trigger { trigger: trigger.clone() }).unwrap();
        prop_assert!(result.effects.is_empty());
        prop_assert_eq!(
            result.new_state,
            ConvState::AwaitingGeneration { task, pending_trigger: Some(trigger) }
        );
    }

    /// Results for any task other than the one in flight are rejected
    #[test]
    fn stale_results_rejected(task in arb_task(), other_id in arb_task_id(), error in arb_error()) {
        prop_assume!(task.id != other_id);
        let state = ConvState::AwaitingGeneration { task, pending_trigger: None };
        let result = transition(
            &state,
            &test_context(),
            Event::GenerationFailed { task_id: other_id.clone(), error },
        );
        prop_assert_eq!(result.unwrap_err(), TransitionError::StaleTask(other_id));
    }

    /// Leaving AwaitingGeneration always clears the typing indicator, and a
    /// failure never appends.
    #[test]
    fn leaving_awaiting_clears_typing(
        task in arb_task(),
        pending in prop::option::of(arb_trigger()),
        event in arb_event(),
    ) {
        let state = ConvState::AwaitingGeneration { task, pending_trigger: pending };
        let is_failure = matches!(event, Event::GenerationFailed { .. } | Event::TaskInvalidated { .. });
        if let Ok(result) = transition(&state, &test_context(), event) {
            if result.new_state.in_flight().is_none() {
                let cleared = result
                    .effects
                    .iter()
                    .any(|e| matches!(e, Effect::SetTyping { speaker: None }));
                prop_assert!(cleared);
            }
            if is_failure {
                let appended = result
                    .effects
                    .iter()
                    .any(|e| matches!(e, Effect::AppendGenerated { .. }));
                prop_assert!(!appended);
            }
        }
    }

    /// Regeneration happens only for validation errors and is bounded
    #[test]
    fn regeneration_is_bounded(task in arb_task(), error in arb_error()) {
        let state = ConvState::AwaitingGeneration { task: task.clone(), pending_trigger: None };
        let result = transition(
            &state,
            &test_context(),
            Event::GenerationFailed { task_id: task.id.clone(), error: error.clone() },
        )
        .unwrap();
        match result.new_state.in_flight() {
            Some(retry) => {
                prop_assert!(error.is_validation());
                prop_assert_eq!(retry.attempt, task.attempt + 1);
                prop_assert!(retry.attempt <= MAX_REGENERATIONS + 1);
            }
            None => prop_assert!(!error.is_validation() || !task.can_regenerate()),
        }
    }

    /// Random event sequences never reach an inconsistent state
    #[test]
    fn event_sequences_stay_consistent(events in prop::collection::vec(arb_event(), 1..30)) {
        let mut state = ConvState::Idle;
        for event in events {
            if let Ok(result) = transition(&state, &test_context(), event) {
                if state.is_stopped() {
                    prop_assert!(false, "stopped state accepted an event");
                }
                state = result.new_state;
            }
        }
    }
}
