//! Conversation scheduler
//!
//! Owns one [`ConversationRuntime`] actor per conversation and routes
//! collaborator notifications to it. Runtimes are created lazily and are
//! independent of each other, so conversations generate concurrently while
//! each one has at most one generation in flight.

mod executor;


pub use executor::ConversationRuntime;

use crate::events::{EventSink, NotificationSound, Silent};
use crate::generation::Generator;
use crate::state_machine::{ConvContext, ConvState, Event, Trigger};
use crate::store::{Conversation, ConversationStore, MembershipChange, Message, StoreError};
use crate::tracker::ActiveConversationTracker;
use crate::turn_selector::TurnSelector;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch, RwLock};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Runtime for conversation {0} has stopped")]
    RuntimeStopped(String),
}

/// Collaborators shared by every runtime
#[derive(Clone)]
pub struct Services {
    pub store: ConversationStore,
    pub tracker: Arc<ActiveConversationTracker>,
    pub generator: Arc<dyn Generator>,
    pub selector: Arc<TurnSelector>,
    pub sink: Arc<dyn EventSink>,
    pub sound: Arc<dyn NotificationSound>,
}

/// Handle to a running conversation
struct ConversationHandle {
    event_tx: mpsc::Sender<Event>,
    state_rx: watch::Receiver<ConvState>,
}

pub struct ConversationScheduler {
    services: Services,
    runtimes: RwLock<HashMap<String, ConversationHandle>>,
}

impl ConversationScheduler {
    pub fn new(
        store: ConversationStore,
        generator: Arc<dyn Generator>,
        selector: TurnSelector,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            services: Services {
                store,
                tracker: Arc::new(ActiveConversationTracker::new()),
                generator,
                selector: Arc::new(selector),
                sink,
                sound: Arc::new(Silent),
            },
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_sound(mut self, sound: Arc<dyn NotificationSound>) -> Self {
        self.services.sound = sound;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.services.store
    }

    pub fn tracker(&self) -> &ActiveConversationTracker {
        &self.services.tracker
    }

    // ==================== Trigger API ====================

    /// A user message was appended; start or queue a turn
    pub async fn notify_user_message_appended(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), SchedulerError> {
        self.send_event(
            conversation_id,
            Event::Trigger {
                trigger: Trigger::UserMessage {
                    message_id: message_id.to_string(),
                },
            },
        )
        .await
    }

    /// A conversation was created; let a recipient open it
    pub async fn notify_conversation_created(
        &self,
        conversation_id: &str,
    ) -> Result<(), SchedulerError> {
        self.send_event(
            conversation_id,
            Event::Trigger {
                trigger: Trigger::ConversationCreated,
            },
        )
        .await
    }

    /// Switch the conversation the user is viewing and clear its unread count.
    /// An unknown conversation leaves the previous selection in place.
    pub fn set_active_conversation(
        &self,
        conversation_id: Option<String>,
    ) -> Result<(), SchedulerError> {
        // Tracker first, so a completion landing in between sees it as read
        let previous = self.services.tracker.set_active(conversation_id.clone());
        if let Some(id) = &conversation_id {
            if let Err(e) = self.services.store.reset_unread(id) {
                self.services.tracker.set_active(previous);
                return Err(e.into());
            }
        }
        tracing::debug!(
            previous = ?previous,
            active = ?conversation_id,
            "Active conversation changed"
        );
        Ok(())
    }

    /// Membership changed; invalidate work for removed speakers
    pub async fn notify_recipients_changed(
        &self,
        conversation_id: &str,
    ) -> Result<(), SchedulerError> {
        let recipients = self.services.store.get(conversation_id)?.recipient_names();
        self.send_event(conversation_id, Event::RecipientsChanged { recipients })
            .await
    }

    /// The conversation is gone; stop its runtime and drop any late result
    pub async fn notify_conversation_deleted(&self, conversation_id: &str) {
        let handle = self.runtimes.write().await.remove(conversation_id);
        if let Some(handle) = handle {
            let _ = handle.event_tx.send(Event::ConversationDeleted).await;
        }
        if self.services.tracker.is_active(conversation_id) {
            self.services.tracker.set_active(None);
        }
        tracing::info!(conv_id = %conversation_id, "Conversation deleted");
    }

    // ==================== Store + notify ====================

    /// Create a conversation and, if given, send its first message
    pub async fn start_conversation(
        &self,
        recipient_names: &[String],
        first_message: Option<&str>,
    ) -> Result<Conversation, SchedulerError> {
        let conversation = self.services.store.create_conversation(recipient_names)?;
        match first_message {
            Some(content) => {
                self.send_user_message(&conversation.id, content, None)
                    .await?;
            }
            None => self.notify_conversation_created(&conversation.id).await?,
        }
        Ok(self.services.store.get(&conversation.id)?)
    }

    pub async fn send_user_message(
        &self,
        conversation_id: &str,
        content: &str,
        html_content: Option<String>,
    ) -> Result<Message, SchedulerError> {
        let message =
            self.services
                .store
                .append_user_message(conversation_id, content, html_content)?;
        self.notify_user_message_appended(conversation_id, &message.id)
            .await?;
        Ok(message)
    }

    pub async fn set_recipients(
        &self,
        conversation_id: &str,
        names: &[String],
    ) -> Result<MembershipChange, SchedulerError> {
        let change = self.services.store.set_recipients(conversation_id, names)?;
        if !change.is_empty() {
            tracing::info!(
                conv_id = %conversation_id,
                added = ?change.added,
                removed = ?change.removed,
                "Recipients changed"
            );
            self.notify_recipients_changed(conversation_id).await?;
        }
        Ok(change)
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), SchedulerError> {
        self.services.store.delete(conversation_id)?;
        self.notify_conversation_deleted(conversation_id).await;
        Ok(())
    }

    /// Current scheduler state, if a runtime exists
    pub async fn state(&self, conversation_id: &str) -> Option<ConvState> {
        self.runtimes
            .read()
            .await
            .get(conversation_id)
            .map(|h| h.state_rx.borrow().clone())
    }

    // ==================== Runtimes ====================

    async fn send_event(&self, conversation_id: &str, event: Event) -> Result<(), SchedulerError> {
        let event_tx = self.get_or_create(conversation_id).await?;
        event_tx
            .send(event)
            .await
            .map_err(|_| SchedulerError::RuntimeStopped(conversation_id.to_string()))
    }

    async fn get_or_create(
        &self,
        conversation_id: &str,
    ) -> Result<mpsc::Sender<Event>, SchedulerError> {
        // Check if already exists
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(conversation_id) {
                if !handle.event_tx.is_closed() {
                    return Ok(handle.event_tx.clone());
                }
            }
        }

        if !self.services.store.contains(conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()).into());
        }

        let mut runtimes = self.runtimes.write().await;
        // Another caller may have won the race
        if let Some(handle) = runtimes.get(conversation_id) {
            if !handle.event_tx.is_closed() {
                return Ok(handle.event_tx.clone());
            }
        }

        let (event_tx, event_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConvState::Idle);
        let runtime = ConversationRuntime::new(
            ConvContext::new(conversation_id),
            self.services.clone(),
            event_rx,
            event_tx.clone(),
            state_tx,
        );
        tokio::spawn(runtime.run());

        runtimes.insert(
            conversation_id.to_string(),
            ConversationHandle {
                event_tx: event_tx.clone(),
                state_rx,
            },
        );
        Ok(event_tx)
    }
}
