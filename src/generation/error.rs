use crate::llm::{LlmError, LlmErrorKind};
use serde::Serialize;
use thiserror::Error;

/// Why a generation produced no usable reply
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationError {
    /// Backend unreachable or failing after all retries
    #[error("Backend error after {attempts} attempt(s): {message}")]
    Transport {
        kind: LlmErrorKind,
        message: String,
        attempts: u32,
    },
    /// The reply named someone outside the candidate set
    #[error("Reply named {sender:?}, expected one of {candidates:?}")]
    InvalidSender {
        sender: String,
        candidates: Vec<String>,
    },
    /// The reply was neither JSON nor `Speaker: content`
    #[error("Malformed reply: {raw}")]
    MalformedResponse { raw: String },
    /// Nobody left to speak by the time the request was built
    #[error("No eligible speaker")]
    NoCandidates,
}

impl GenerationError {
    pub fn transport(err: &LlmError, attempts: u32) -> Self {
        Self::Transport {
            kind: err.kind,
            message: err.message.clone(),
            attempts,
        }
    }

    /// Semantic failures of a reply that did arrive. These may be worth one
    /// regeneration; transport failures are already retried inside the
    /// client.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSender { .. } | Self::MalformedResponse { .. }
        )
    }
}
