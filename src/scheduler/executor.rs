//! Conversation runtime executor

use super::Services;
use crate::events::GenerationFailure;
use crate::generation::{GenerationContext, GenerationError};
use crate::state_machine::{transition, ConvContext, ConvState, Effect, Event, GenerationTask};
use crate::store::{Conversation, MessageUpdate, Reaction, Sender, StoreError};
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Actor owning one conversation's scheduling state.
///
/// Events are handled strictly one at a time; the only concurrent work is
/// the spawned generation, which reports back through `event_tx`.
pub struct ConversationRuntime {
    context: ConvContext,
    state: ConvState,
    services: Services,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    state_tx: watch::Sender<ConvState>,
    /// Token for the running generation, keyed by task id
    generation_cancel: Option<(String, CancellationToken)>,
}

impl ConversationRuntime {
    pub fn new(
        context: ConvContext,
        services: Services,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        state_tx: watch::Sender<ConvState>,
    ) -> Self {
        Self {
            context,
            state: ConvState::Idle,
            services,
            event_rx,
            event_tx,
            state_tx,
            generation_cancel: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(conv_id = %self.context.conversation_id, "Starting conversation runtime");

        while let Some(event) = self.event_rx.recv().await {
            if let Err(e) = self.process_event(event) {
                tracing::error!(conv_id = %self.context.conversation_id, error = %e, "Error handling event");
            }
            if self.state.is_stopped() {
                break;
            }
        }

        self.cancel_generation();
        tracing::info!(conv_id = %self.context.conversation_id, "Conversation runtime stopped");
    }

    fn process_event(&mut self, event: Event) -> Result<(), String> {
        // Effects can produce follow-up events; handle them in a loop
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let result = match transition(&self.state, &self.context, current_event) {
                Ok(r) => r,
                Err(e) if e.is_benign() => {
                    tracing::debug!(conv_id = %self.context.conversation_id, reason = %e, "Event ignored");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(conv_id = %self.context.conversation_id, error = %e, "Transition rejected");
                    continue;
                }
            };

            self.state = result.new_state;
            self.state_tx.send_replace(self.state.clone());

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect)? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    fn execute_effect(&mut self, effect: Effect) -> Result<Option<Event>, String> {
        let conv_id = self.context.conversation_id.clone();
        match effect {
            Effect::PlanTurn { answer_trigger } => Ok(Some(self.plan_turn(answer_trigger))),

            Effect::RequestGeneration { task } => Ok(self.dispatch_generation(task)),

            Effect::CancelGeneration { task_id } => {
                if matches!(&self.generation_cancel, Some((id, _)) if *id == task_id) {
                    tracing::info!(conv_id = %conv_id, task_id = %task_id, "Cancelling generation");
                    self.cancel_generation();
                }
                Ok(None)
            }

            Effect::AppendGenerated { task, reply } => {
                self.generation_cancel = None;
                let message = match self.services.store.append_recipient_message(
                    &conv_id,
                    &reply.speaker,
                    &reply.content,
                ) {
                    Ok(message) => message,
                    Err(e @ (StoreError::ConversationNotFound(_) | StoreError::NotARecipient(_))) => {
                        tracing::info!(
                            conv_id = %conv_id,
                            task_id = %task.id,
                            reason = %e,
                            "Discarding completion"
                        );
                        return Ok(None);
                    }
                    Err(e) => return Err(e.to_string()),
                };

                tracing::info!(
                    conv_id = %conv_id,
                    task_id = %task.id,
                    speaker = %reply.speaker,
                    seq = message.seq,
                    "Appended generated message"
                );
                self.services.sink.on_message_generated(&conv_id, &message);
                if self.bump_unread()? {
                    self.services.sound.play(&conv_id);
                }

                self.maybe_react(&task, &reply.speaker)?;
                Ok(None)
            }

            Effect::SetTyping { speaker } => {
                self.services
                    .sink
                    .on_typing_status_changed(Some(&conv_id), speaker.as_deref());
                Ok(None)
            }

            Effect::ReportError { task, error } => {
                self.generation_cancel = None;
                if self.snapshot().is_none() {
                    tracing::info!(
                        conv_id = %conv_id,
                        task_id = %task.id,
                        error = %error,
                        "Dropping failure for deleted conversation"
                    );
                    return Ok(None);
                }
                tracing::warn!(
                    conv_id = %conv_id,
                    task_id = %task.id,
                    attempt = task.attempt,
                    error = %error,
                    "Generation failed"
                );
                self.services.sink.on_error(&GenerationFailure {
                    conversation_id: conv_id,
                    speaker: task.speaker,
                    error,
                });
                Ok(None)
            }

            Effect::Halt => {
                self.cancel_generation();
                Ok(None)
            }
        }
    }

    /// Ask the turn selector for the next speaker. A trigger always gets an
    /// answer; otherwise the chain bound and continuation roll apply.
    fn plan_turn(&self, answer_trigger: bool) -> Event {
        let Some(conversation) = self.snapshot() else {
            return Event::ChainEnded;
        };

        let last = conversation.last_spoken_message();
        let turns = conversation.automatic_turns_since_user();
        let selector = &self.services.selector;
        let speaker = if answer_trigger {
            selector.select_opening_speaker(&conversation.recipients, last)
        } else {
            selector.select_next_speaker(&conversation.recipients, last, turns)
        };
        let Some(speaker) = speaker else {
            tracing::debug!(conv_id = %conversation.id, turns, "Chain ended");
            return Event::ChainEnded;
        };

        Event::TurnPlanned {
            task: GenerationTask {
                id: uuid::Uuid::new_v4().to_string(),
                conversation_id: conversation.id.clone(),
                anchor_message_id: conversation.last_message().map(|m| m.id.clone()),
                candidates: vec![speaker.name.clone()],
                speaker: speaker.name,
                attempt: 1,
                created_at: Utc::now(),
            },
        }
    }

    /// Spawn the backend call for `task`.
    ///
    /// Candidates are narrowed to the current recipients first; if nobody is
    /// left the task is invalidated instead.
    fn dispatch_generation(&mut self, task: GenerationTask) -> Option<Event> {
        let invalidated = Event::TaskInvalidated {
            task_id: task.id.clone(),
        };
        let Some(conversation) = self.snapshot() else {
            return Some(invalidated);
        };

        let candidates: Vec<String> = task
            .candidates
            .iter()
            .filter(|c| conversation.has_recipient(c))
            .cloned()
            .collect();
        if candidates.is_empty() {
            tracing::info!(conv_id = %conversation.id, task_id = %task.id, "No candidates left, dropping task");
            return Some(invalidated);
        }

        let context = GenerationContext::from_conversation(&conversation);
        let cancel_token = CancellationToken::new();
        self.cancel_generation();
        self.generation_cancel = Some((task.id.clone(), cancel_token.clone()));

        let generator = self.services.generator.clone();
        let event_tx = self.event_tx.clone();
        let conv_id = conversation.id.clone();

        tokio::spawn(async move {
            tracing::info!(
                conv_id = %conv_id,
                task_id = %task.id,
                speaker = %task.speaker,
                attempt = task.attempt,
                candidates = ?candidates,
                "Making generation request (background)"
            );

            tokio::select! {
                biased;

                () = cancel_token.cancelled() => {
                    tracing::info!(conv_id = %conv_id, task_id = %task.id, "Generation cancelled");
                }

                result = generator.generate_reply(&context, &candidates) => {
                    let event = match result {
                        // Typing already names the task speaker
                        Ok(reply) if !candidates.contains(&reply.speaker) => Event::GenerationFailed {
                            task_id: task.id,
                            error: GenerationError::InvalidSender {
                                sender: reply.speaker,
                                candidates: candidates.clone(),
                            },
                        },
                        Ok(reply) => Event::GenerationSucceeded { task_id: task.id, reply },
                        Err(error) => Event::GenerationFailed { task_id: task.id, error },
                    };
                    // Runtime may already be gone (conversation deleted)
                    let _ = event_tx.send(event).await;
                }
            }
        });

        None
    }

    /// Increment unread unless the conversation is being viewed or muted.
    /// Evaluated now, against the tracker's current value.
    fn bump_unread(&self) -> Result<bool, String> {
        let conv_id = &self.context.conversation_id;
        if self.services.tracker.is_active(conv_id) {
            return Ok(false);
        }
        let Some(conversation) = self.snapshot() else {
            return Ok(false);
        };
        if conversation.hide_alerts {
            return Ok(false);
        }
        let unread = self
            .services
            .store
            .increment_unread(conv_id)
            .map_err(|e| e.to_string())?;
        tracing::debug!(conv_id = %conv_id, unread, "Unread count bumped");
        Ok(true)
    }

    /// Maybe have another recipient react to the message that was answered
    fn maybe_react(&self, task: &GenerationTask, speaker: &str) -> Result<(), String> {
        let conv_id = &self.context.conversation_id;
        let Some(anchor_id) = &task.anchor_message_id else {
            return Ok(());
        };
        let Some(conversation) = self.snapshot() else {
            return Ok(());
        };
        let Some(anchor) = conversation.message(anchor_id) else {
            return Ok(());
        };
        if anchor.sender == Sender::System {
            return Ok(());
        }

        // Nobody reacts to their own message
        let pool: Vec<_> = conversation
            .recipients
            .iter()
            .filter(|r| Some(r.name.as_str()) != anchor.sender.recipient_name())
            .cloned()
            .collect();
        let Some((reactor, kind)) = self.services.selector.select_reaction(&pool, speaker) else {
            return Ok(());
        };

        let updated = match self.services.store.apply_reaction_update(
            conv_id,
            anchor_id,
            vec![Reaction::new(kind, reactor.clone())],
        ) {
            Ok(message) => message,
            Err(StoreError::ConversationNotFound(_) | StoreError::MessageNotFound(_)) => {
                return Ok(())
            }
            Err(e) => return Err(e.to_string()),
        };

        tracing::debug!(conv_id = %conv_id, reactor = %reactor, kind = ?kind, "Automatic reaction");
        self.services.sink.on_message_updated(
            conv_id,
            anchor_id,
            &MessageUpdate {
                reactions: updated.reactions,
            },
        );
        self.bump_unread()?;
        Ok(())
    }

    fn snapshot(&self) -> Option<Conversation> {
        self.services.store.get(&self.context.conversation_id).ok()
    }

    fn cancel_generation(&mut self) {
        if let Some((_, token)) = self.generation_cancel.take() {
            token.cancel();
        }
    }
}
