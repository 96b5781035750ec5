//! Conversation and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label the local user is stored under
pub const USER_LABEL: &str = "me";
/// Label for membership notices and other engine-authored messages
pub const SYSTEM_LABEL: &str = "system";

/// Who authored a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sender {
    /// The local (human) user
    User,
    /// Engine-authored notices, never an automatic speaker
    System,
    /// An automatic participant, by name
    Recipient(String),
}

impl Sender {
    pub fn recipient(name: impl Into<String>) -> Self {
        Sender::Recipient(name.into())
    }

    pub fn label(&self) -> &str {
        match self {
            Sender::User => USER_LABEL,
            Sender::System => SYSTEM_LABEL,
            Sender::Recipient(name) => name,
        }
    }

    pub fn recipient_name(&self) -> Option<&str> {
        match self {
            Sender::Recipient(name) => Some(name),
            _ => None,
        }
    }
}

impl From<String> for Sender {
    fn from(label: String) -> Self {
        match label.as_str() {
            USER_LABEL => Sender::User,
            SYSTEM_LABEL => Sender::System,
            _ => Sender::Recipient(label),
        }
    }
}

impl From<Sender> for String {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => USER_LABEL.to_string(),
            Sender::System => SYSTEM_LABEL.to_string(),
            Sender::Recipient(name) => name,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A simulated participant of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub name: String,
}

impl Recipient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
        }
    }
}

/// Tapback kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    Heart,
    Like,
    Dislike,
    Laugh,
    Emphasize,
    Question,
}

impl ReactionType {
    pub const ALL: [ReactionType; 6] = [
        ReactionType::Heart,
        ReactionType::Like,
        ReactionType::Dislike,
        ReactionType::Laugh,
        ReactionType::Emphasize,
        ReactionType::Question,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(rename = "type")]
    pub kind: ReactionType,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

impl Reaction {
    pub fn new(kind: ReactionType, sender: impl Into<String>) -> Self {
        Self {
            kind,
            sender: sender.into(),
            timestamp: Utc::now(),
        }
    }

    /// Identity used for deduplication
    pub fn key(&self) -> (ReactionType, &str) {
        (self.kind, &self.sender)
    }
}

/// A single entry in a conversation's history.
///
/// `sender` and `content` never change after creation; only `reactions`
/// are merged into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// UUIDv7; later messages have greater ids
    pub id: String,
    /// Position in the conversation, strictly increasing
    pub seq: u64,
    pub sender: Sender,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
}

/// Partial update published with `on_message_updated`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageUpdate {
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub recipients: Vec<Recipient>,
    pub messages: Vec<Message>,
    pub last_message_time: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub hide_alerts: bool,
    #[serde(default)]
    pub pinned: bool,
}

impl Conversation {
    pub fn new(id: impl Into<String>, recipients: Vec<Recipient>) -> Self {
        Self {
            id: id.into(),
            recipients,
            messages: Vec::new(),
            last_message_time: Utc::now(),
            unread_count: 0,
            hide_alerts: false,
            pinned: false,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn has_recipient(&self, name: &str) -> bool {
        self.recipients.iter().any(|r| r.name == name)
    }

    pub fn recipient_names(&self) -> Vec<String> {
        self.recipients.iter().map(|r| r.name.clone()).collect()
    }

    /// Number of automatic messages since the user last spoke.
    ///
    /// System notices neither count nor break the run.
    pub fn automatic_turns_since_user(&self) -> u32 {
        let mut turns = 0;
        for message in self.messages.iter().rev() {
            match message.sender {
                Sender::User => break,
                Sender::System => {}
                Sender::Recipient(_) => turns += 1,
            }
        }
        turns
    }

    /// Most recent message not authored by the engine itself
    pub fn last_spoken_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| !matches!(m.sender, Sender::System))
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.messages.last().map_or(1, |m| m.seq + 1)
    }
}
