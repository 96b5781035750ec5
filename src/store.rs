//! In-process conversation store
//!
//! Holds the authoritative history for every conversation. The map is
//! partitioned by conversation id: the outer lock is only held to look a
//! partition up, and each partition has its own mutex so appends to one
//! conversation never wait on another.

mod model;
pub mod reactions;

#[cfg(test)]
mod proptests;

pub use model::*;

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Conversation already exists: {0}")]
    ConversationExists(String),
    #[error("Message not found: {0}")]
    MessageNotFound(String),
    #[error("A conversation needs at least one recipient")]
    NoRecipients,
    #[error("Duplicate recipient: {0}")]
    DuplicateRecipient(String),
    #[error("Reserved recipient name: {0}")]
    ReservedName(String),
    #[error("{0} is not a recipient of this conversation")]
    NotARecipient(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a membership change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// One system notice per added or removed name
    pub notices: Vec<Message>,
}

impl MembershipChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

type Partition = Arc<Mutex<Conversation>>;

/// Thread-safe store handle
#[derive(Clone, Default)]
pub struct ConversationStore {
    partitions: Arc<RwLock<HashMap<String, Partition>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Conversation Operations ====================

    /// Create an empty conversation with fresh recipient ids
    pub fn create_conversation(&self, recipient_names: &[String]) -> StoreResult<Conversation> {
        let names = validate_recipient_names(recipient_names)?;
        let recipients = names.into_iter().map(Recipient::new).collect();
        let conversation = Conversation::new(uuid::Uuid::new_v4().to_string(), recipients);
        self.insert(conversation.clone())?;
        Ok(conversation)
    }

    /// Insert a fully formed conversation (seeding, imports)
    pub fn insert(&self, conversation: Conversation) -> StoreResult<()> {
        let names: Vec<String> = conversation.recipient_names();
        validate_recipient_names(&names)?;

        let mut partitions = write(&self.partitions);
        if partitions.contains_key(&conversation.id) {
            return Err(StoreError::ConversationExists(conversation.id));
        }
        partitions.insert(
            conversation.id.clone(),
            Arc::new(Mutex::new(conversation)),
        );
        Ok(())
    }

    /// Snapshot of a conversation
    pub fn get(&self, id: &str) -> StoreResult<Conversation> {
        let partition = self.partition(id)?;
        let conversation = lock(&partition).clone();
        Ok(conversation)
    }

    pub fn contains(&self, id: &str) -> bool {
        read(&self.partitions).contains_key(id)
    }

    /// All conversations, pinned first, then most recently active
    pub fn list(&self) -> Vec<Conversation> {
        let partitions: Vec<Partition> = read(&self.partitions).values().cloned().collect();
        let mut conversations: Vec<Conversation> =
            partitions.iter().map(|p| lock(p).clone()).collect();
        conversations.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.last_message_time.cmp(&a.last_message_time))
        });
        conversations
    }

    pub fn delete(&self, id: &str) -> StoreResult<()> {
        write(&self.partitions)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    // ==================== Message Operations ====================

    pub fn append_user_message(
        &self,
        id: &str,
        content: &str,
        html_content: Option<String>,
    ) -> StoreResult<Message> {
        self.with_conversation(id, |conv| {
            let message = push_message(conv, Sender::User, content, html_content);
            conv.unread_count = 0;
            Ok(message)
        })
    }

    /// Append a message authored by an automatic participant.
    ///
    /// Fails if `name` is no longer a recipient, which is how completions
    /// for a removed speaker get discarded.
    pub fn append_recipient_message(
        &self,
        id: &str,
        name: &str,
        content: &str,
    ) -> StoreResult<Message> {
        self.with_conversation(id, |conv| {
            if !conv.has_recipient(name) {
                return Err(StoreError::NotARecipient(name.to_string()));
            }
            Ok(push_message(conv, Sender::recipient(name), content, None))
        })
    }

    pub fn append_system_message(&self, id: &str, content: &str) -> StoreResult<Message> {
        self.with_conversation(id, |conv| {
            Ok(push_message(conv, Sender::System, content, None))
        })
    }

    pub fn messages(&self, id: &str) -> StoreResult<Vec<Message>> {
        let partition = self.partition(id)?;
        let messages = lock(&partition).messages.clone();
        Ok(messages)
    }

    /// Merge reactions into a message (see [`reactions::merge_reactions`])
    pub fn apply_reaction_update(
        &self,
        id: &str,
        message_id: &str,
        incoming: Vec<Reaction>,
    ) -> StoreResult<Message> {
        self.with_message(id, message_id, |message| {
            reactions::merge_reactions(&mut message.reactions, incoming);
        })
    }

    /// Toggle a reaction (see [`reactions::toggle_reaction`])
    pub fn toggle_reaction(
        &self,
        id: &str,
        message_id: &str,
        reaction: Reaction,
    ) -> StoreResult<Message> {
        self.with_message(id, message_id, |message| {
            reactions::toggle_reaction(&mut message.reactions, reaction);
        })
    }

    // ==================== Membership ====================

    /// Replace the recipient list, keeping ids of names that stay.
    ///
    /// Appends one system notice per removed and per added name.
    pub fn set_recipients(&self, id: &str, names: &[String]) -> StoreResult<MembershipChange> {
        let names = validate_recipient_names(names)?;
        self.with_conversation(id, |conv| {
            let current = conv.recipient_names();
            let removed: Vec<String> = current
                .iter()
                .filter(|name| !names.contains(name))
                .cloned()
                .collect();
            let added: Vec<String> = names
                .iter()
                .filter(|name| !current.contains(name))
                .cloned()
                .collect();

            conv.recipients = names
                .iter()
                .map(|name| {
                    conv.recipients
                        .iter()
                        .find(|r| &r.name == name)
                        .cloned()
                        .unwrap_or_else(|| Recipient::new(name.clone()))
                })
                .collect();

            let mut notices = Vec::with_capacity(removed.len() + added.len());
            for name in &removed {
                let text = format!("{name} was removed from the conversation");
                notices.push(push_message(conv, Sender::System, &text, None));
            }
            for name in &added {
                let text = format!("{name} was added to the conversation");
                notices.push(push_message(conv, Sender::System, &text, None));
            }

            Ok(MembershipChange {
                added,
                removed,
                notices,
            })
        })
    }

    // ==================== Flags & Counters ====================

    pub fn set_hide_alerts(&self, id: &str, hide: bool) -> StoreResult<()> {
        self.with_conversation(id, |conv| {
            conv.hide_alerts = hide;
            Ok(())
        })
    }

    pub fn set_pinned(&self, id: &str, pinned: bool) -> StoreResult<()> {
        self.with_conversation(id, |conv| {
            conv.pinned = pinned;
            Ok(())
        })
    }

    pub fn reset_unread(&self, id: &str) -> StoreResult<()> {
        self.with_conversation(id, |conv| {
            conv.unread_count = 0;
            Ok(())
        })
    }

    /// Returns the new unread count
    pub fn increment_unread(&self, id: &str) -> StoreResult<u32> {
        self.with_conversation(id, |conv| {
            conv.unread_count = conv.unread_count.saturating_add(1);
            Ok(conv.unread_count)
        })
    }

    // ==================== Internals ====================

    fn partition(&self, id: &str) -> StoreResult<Partition> {
        read(&self.partitions)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    /// Run a mutation under the conversation's partition lock
    fn with_conversation<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Conversation) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let partition = self.partition(id)?;
        let mut conv = lock(&partition);
        f(&mut conv)
    }

    fn with_message(
        &self,
        id: &str,
        message_id: &str,
        f: impl FnOnce(&mut Message),
    ) -> StoreResult<Message> {
        self.with_conversation(id, |conv| {
            let message = conv
                .messages
                .iter_mut()
                .find(|m| m.id == message_id)
                .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;
            f(message);
            Ok(message.clone())
        })
    }
}

fn push_message(
    conv: &mut Conversation,
    sender: Sender,
    content: &str,
    html_content: Option<String>,
) -> Message {
    // Timestamps never go backwards inside a conversation, even if the
    // wall clock does.
    let now = Utc::now();
    let timestamp = conv
        .last_message()
        .map_or(now, |last| last.timestamp.max(now));

    let message = Message {
        // Time-ordered, so ids sort in append order
        id: uuid::Uuid::now_v7().to_string(),
        seq: conv.next_seq(),
        sender,
        content: content.to_string(),
        html_content,
        timestamp,
        reactions: Vec::new(),
    };
    conv.messages.push(message.clone());
    conv.last_message_time = timestamp;
    message
}

fn validate_recipient_names(names: &[String]) -> StoreResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if name == USER_LABEL || name == SYSTEM_LABEL {
            return Err(StoreError::ReservedName(name.to_string()));
        }
        if !seen.insert(name.to_string()) {
            return Err(StoreError::DuplicateRecipient(name.to_string()));
        }
        cleaned.push(name.to_string());
    }
    if cleaned.is_empty() {
        return Err(StoreError::NoRecipients);
    }
    Ok(cleaned)
}

fn lock(partition: &Mutex<Conversation>) -> MutexGuard<'_, Conversation> {
    partition.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read(
    partitions: &RwLock<HashMap<String, Partition>>,
) -> std::sync::RwLockReadGuard<'_, HashMap<String, Partition>> {
    partitions.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(
    partitions: &RwLock<HashMap<String, Partition>>,
) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Partition>> {
    partitions.write().unwrap_or_else(PoisonError::into_inner)
}
