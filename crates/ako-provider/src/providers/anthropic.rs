//! Anthropic Claude provider implementation.
//!
//! Implements the Provider trait for Anthropic's Messages API with SSE streaming.

use crate::error::ProviderError;
use crate::prompt::{user_prompt, SYSTEM_PROMPT};
use crate::stream::{cancellable, check_payload, open_sse_stream};
use crate::traits::Provider;
use crate::types::{Frame, TextStream};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

const API_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: usize = 1024;

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    payload_limit: Option<usize>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider. An empty `model` selects the default.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model
            },
            base_url: API_BASE.to_string(),
            payload_limit: None,
        }
    }

    /// Create with a custom base URL (for testing/proxy).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Reuse an existing HTTP client (and its connection pool).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Reject diffs longer than `limit` bytes before sending them.
    pub fn with_payload_limit(mut self, limit: impl Into<Option<usize>>) -> Self {
        self.payload_limit = limit.into();
        self
    }

    /// Build the Messages API request body.
    fn build_request_body(&self, diff: &str) -> Value {
        json!({
            "model": self.model,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": [{"type": "text", "text": user_prompt(diff)}],
            }],
            "max_tokens": DEFAULT_MAX_TOKENS,
            "stream": true,
        })
    }

    /// Parse one SSE `data` payload.
    fn parse_sse_event(data: &str) -> Result<Frame, ProviderError> {
        let event: AnthropicEvent = serde_json::from_str(data)?;
        Ok(match event {
            AnthropicEvent::ContentBlockDelta { delta } => match delta {
                Delta::Text { text } => Frame::text(text),
                Delta::Other => Frame::skip(),
            },
            AnthropicEvent::MessageStop => Frame::done(),
            AnthropicEvent::Error { error } => return Err(error.into_provider_error()),
            AnthropicEvent::Other => Frame::skip(),
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        diff: &str,
        cancel: CancellationToken,
    ) -> Result<TextStream, ProviderError> {
        check_payload(diff, self.payload_limit)?;
        let body = self.build_request_body(diff);

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        tracing::debug!(model = %self.model, diff_bytes = diff.len(), "anthropic request");
        let text =
            open_sse_stream(request, diff.len(), true, Self::parse_sse_event, &cancel).await?;
        Ok(cancellable(text, cancel))
    }
}

// ──────────────────────────────────────────────────────────
// Anthropic SSE event types (internal)
// ──────────────────────────────────────────────────────────

/// Top-level SSE event from the Anthropic API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: Delta },

    #[serde(rename = "message_stop")]
    MessageStop,

    #[serde(rename = "error")]
    Error { error: ErrorData },

    /// message_start, content_block_start/stop, message_delta, ping.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Delta {
    #[serde(rename = "text_delta")]
    Text { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl ErrorData {
    fn into_provider_error(self) -> ProviderError {
        let detail = format!("{}: {}", self.error_type, self.message);
        match self.error_type.as_str() {
            "authentication_error" | "permission_error" => ProviderError::Auth(detail),
            _ => ProviderError::Api(detail),
        }
    }
}

// ──────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────
