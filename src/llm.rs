//! Generation backend abstraction
//!
//! The dialogue engine only needs plain chat completions: a system prompt, a
//! list of role-tagged lines, and one text reply back.

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::*;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for chat completion backends
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmService + ?Sized> LlmService for Arc<T> {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.as_ref().complete(request).await
    }

    fn model_id(&self) -> &str {
        self.as_ref().model_id()
    }
}

/// Build the configured backend, wrapped in [`LoggingService`].
///
/// In gateway mode the gateway handles authentication, so no key is needed.
pub fn build_service(config: &LlmConfig) -> Result<Arc<dyn LlmService>, LlmError> {
    let api_key = match (&config.gateway, &config.api_key) {
        (Some(_), _) => "implicit".to_string(),
        (None, Some(key)) => key.clone(),
        (None, None) => {
            return Err(LlmError::auth(
                "OPENAI_API_KEY is not set and no LLM_GATEWAY is configured",
            ))
        }
    };

    let service = OpenAIService::new(
        api_key,
        config.model.clone(),
        config.gateway.as_deref(),
        config.request_timeout,
    )?;
    Ok(Arc::new(LoggingService::new(Arc::new(service))))
}

/// Logging wrapper for backend services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Generation request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    kind = %e.kind,
                    error = %e.message,
                    retryable = e.is_retryable(),
                    "Generation request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
