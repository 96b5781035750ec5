//! `OpenAI` chat completions backend

use super::types::{LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmErrorKind, LlmService};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Chat completions client for `OpenAI` and compatible gateways
pub struct OpenAIService {
    client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAIService {
    /// `gateway` replaces the `OpenAI` host; requests go to
    /// `{gateway}/openai/v1/chat/completions`.
    pub fn new(
        api_key: String,
        model: impl Into<String>,
        gateway: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let url = match gateway {
            Some(gw) => format!("{}/openai/v1/chat/completions", gw.trim_end_matches('/')),
            None => format!("{DEFAULT_BASE_URL}/v1/chat/completions"),
        };

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            url,
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        let system: Vec<&str> = request.system.iter().map(|s| s.text.as_str()).collect();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: Some(system.join("\n\n")),
            });
        }

        for msg in &request.messages {
            let role = match msg.role {
                MessageRole::User => "user",
            };
            messages.push(ChatMessage {
                role: role.to_string(),
                content: Some(msg.content.clone()),
            });
        }

        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request.json_output.then(|| ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        }
    }

    fn normalize_response(resp: ChatResponse) -> Result<LlmResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::unknown("No choices in response"))?;

        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        Ok(LlmResponse {
            text: choice.message.content.unwrap_or_default(),
            usage,
        })
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            let kind = LlmErrorKind::from_status(status.as_u16());
            let mut err = LlmError::new(kind, format!("HTTP {status}: {message}"));
            if let Some(after) = retry_after {
                err = err.with_retry_after(after);
            }
            return Err(err);
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Self::normalize_response(parsed)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
