//! Ollama provider for local inference.
//!
//! Uses the native `/api/chat` endpoint, which streams newline-delimited JSON
//! objects and needs no credential.

use crate::error::ProviderError;
use crate::prompt::{user_prompt, SYSTEM_PROMPT};
use crate::stream::{cancellable, check_payload, ndjson_text_stream};
use crate::traits::Provider;
use crate::types::{Frame, TextStream};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Host used when the configuration leaves it empty.
pub const DEFAULT_HOST: &str = "http://localhost:11434";
/// Model used when the configuration leaves it empty.
pub const DEFAULT_MODEL: &str = "gemma3:1b";

/// Ollama chat provider.
pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
    payload_limit: Option<usize>,
}

impl OllamaProvider {
    /// Create a provider for the Ollama server at `host`.
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        let host = host.into();
        let model = model.into();
        Self {
            client: Client::new(),
            host: normalize_host(&host),
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model
            },
            payload_limit: None,
        }
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

    pub fn host(&self) -> &str {
        &self.host
    }

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

    /// Parse one NDJSON line.
    fn parse_line(line: &[u8]) -> Result<Frame, ProviderError> {
        let chunk: ChatChunk = serde_json::from_slice(line)?;
        if let Some(error) = chunk.error {
            return Err(ProviderError::Api(error));
        }

        let mut frame = Frame::skip();
        if let Some(message) = chunk.message {
            frame.chunks.push(message.content);
        }
        frame.done = chunk.done;
        Ok(frame)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
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

        tracing::debug!(host = %self.host, model = %self.model, diff_bytes = diff.len(), "ollama request");
        let send = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Canceled),
            response = send => response.map_err(|err| {
                if err.is_builder() {
                    ProviderError::Api(format!("invalid ollama host {:?}: {err}", self.host))
                } else {
                    ProviderError::Connection(err)
                }
            })?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body, diff.len()));
        }

        let text = ndjson_text_stream(response.bytes_stream().boxed(), Self::parse_line);
        Ok(cancellable(text, cancel))
    }
}

/// Fill in the default host and an `http://` scheme when missing, the way
/// `OLLAMA_HOST` is read.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        DEFAULT_HOST.to_string()
    } else if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

// -- /api/chat stream types --

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}
