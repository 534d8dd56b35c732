//! OpenAI provider.
//!
//! Speaks the chat completions API with SSE streaming. Any server that
//! implements the same protocol works through [`OpenAiProvider::with_base_url`].

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

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// A provider that speaks the OpenAI chat completions protocol.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    payload_limit: Option<usize>,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider. An empty `model` selects the default.
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
            base_url: OPENAI_BASE_URL.to_string(),
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

    /// Build the JSON request body.
    fn build_request_body(&self, diff: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(diff)},
            ],
            "stream": true,
        })
    }

    /// Parse one SSE `data` payload.
    fn parse_sse_event(data: &str) -> Result<Frame, ProviderError> {
        if data.trim() == "[DONE]" {
            return Ok(Frame::done());
        }

        let chunk: OpenAiChunk = serde_json::from_str(data)?;
        if let Some(error) = chunk.error {
            return Err(ProviderError::Api(error.message));
        }

        let chunks = chunk
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.content)
            .collect();
        Ok(Frame {
            chunks,
            done: false,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
        let url = format!("{}/chat/completions", self.base_url);

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        tracing::debug!(model = %self.model, diff_bytes = diff.len(), "openai request");
        let text =
            open_sse_stream(request, diff.len(), true, Self::parse_sse_event, &cancel).await?;
        Ok(cancellable(text, cancel))
    }
}

// -- OpenAI response types for deserialization --

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChunkChoice>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChunkChoice {
    delta: OpenAiDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    #[serde(default)]
    message: String,
}
