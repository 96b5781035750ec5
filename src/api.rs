//! HTTP API for the dialogue engine
//!
//! Conversation management, the event stream, and the stateless chat
//! endpoint.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::events::BroadcastSink;
use crate::generation::Generator;
use crate::scheduler::ConversationScheduler;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<ConversationScheduler>,
    pub events: BroadcastSink,
    /// Used directly by the stateless chat endpoint
    pub generator: Arc<dyn Generator>,
}

impl AppState {
    pub fn new(
        scheduler: Arc<ConversationScheduler>,
        events: BroadcastSink,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            scheduler,
            events,
            generator,
        }
    }
}
