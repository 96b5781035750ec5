//! Which conversation the user is looking at

use std::sync::{PoisonError, RwLock};

/// Process-wide record of the active conversation.
///
/// Completions read this at append time, not at dispatch time, so a reply
/// that lands after the user switched away still counts as unread.
#[derive(Debug, Default)]
pub struct ActiveConversationTracker {
    active: RwLock<Option<String>>,
}

impl ActiveConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active conversation, returning the previous one
    pub fn set_active(&self, conversation_id: Option<String>) -> Option<String> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, conversation_id)
    }

    pub fn active(&self) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(conversation_id)
    }
}
