//! Generation client
//!
//! Turns a conversation snapshot into one reply from one of the candidate
//! speakers. Transport failures are retried here with exponential backoff;
//! a reply that arrives but cannot be used is returned as a validation error
//! for the scheduler to decide on.

mod error;
mod parse;
mod prompt;

pub use error::GenerationError;
pub use parse::parse_reply;
pub use prompt::build_request;

use crate::config::{EngineConfig, LlmConfig};
use crate::llm::{LlmError, LlmService};
use crate::store::Conversation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One line of history as the backend sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLine {
    pub sender: String,
    pub content: String,
}

impl HistoryLine {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
        }
    }
}

/// Everything the backend is told about a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationContext {
    /// All recipient names, in conversation order
    pub participants: Vec<String>,
    pub history: Vec<HistoryLine>,
}

impl GenerationContext {
    /// Snapshot a conversation's history and membership
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            participants: conversation.recipient_names(),
            history: conversation
                .messages
                .iter()
                .map(|m| HistoryLine::new(m.sender.label(), m.content.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedReply {
    #[serde(rename = "sender")]
    pub speaker: String,
    pub content: String,
}

/// Produces the next automatic message for a conversation
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate_reply(
        &self,
        context: &GenerationContext,
        candidates: &[String],
    ) -> Result<GeneratedReply, GenerationError>;
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Arc<T> {
    async fn generate_reply(
        &self,
        context: &GenerationContext,
        candidates: &[String],
    ) -> Result<GeneratedReply, GenerationError> {
        self.as_ref().generate_reply(context, candidates).await
    }
}

/// Retry policy for one generation call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Deadline for a single backend call; expiry counts as a retryable
    /// transport failure
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.transport_attempts.max(1),
            base_delay: config.backoff_base,
            timeout: config.generation_timeout,
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2x, 4x, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }
}

/// [`Generator`] backed by an [`LlmService`]
pub struct GenerationClient {
    llm: Arc<dyn LlmService>,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl GenerationClient {
    pub fn new(llm: Arc<dyn LlmService>, llm_config: &LlmConfig, engine: &EngineConfig) -> Self {
        Self {
            llm,
            temperature: llm_config.temperature,
            max_tokens: llm_config.max_tokens,
            retry: RetryPolicy::from_config(engine),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Call the backend, retrying retryable failures.
    ///
    /// Returns the raw completion text or the last error with the number of
    /// attempts made.
    async fn complete_with_retry(
        &self,
        context: &GenerationContext,
        candidates: &[String],
    ) -> Result<String, (LlmError, u32)> {
        let request = build_request(context, candidates, self.temperature, self.max_tokens);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(self.retry.timeout, self.llm.complete(&request))
                .await
                .unwrap_or_else(|_| Err(LlmError::timeout(self.retry.timeout)));
            match result {
                Ok(response) => return Ok(response.text),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = e
                        .retry_after
                        .unwrap_or_else(|| self.retry.delay_for(attempt));
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Generation transport error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err((e, attempt)),
            }
        }
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate_reply(
        &self,
        context: &GenerationContext,
        candidates: &[String],
    ) -> Result<GeneratedReply, GenerationError> {
        if candidates.is_empty() {
            return Err(GenerationError::NoCandidates);
        }

        let raw = self
            .complete_with_retry(context, candidates)
            .await
            .map_err(|(e, attempts)| GenerationError::transport(&e, attempts))?;

        parse_reply(&raw, candidates)
    }
}
