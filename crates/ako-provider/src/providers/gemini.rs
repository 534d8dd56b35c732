//! Google Gemini provider, served either by the Gemini API or by Vertex AI.
//!
//! Both backends accept the same `streamGenerateContent` body and stream the
//! same `GenerateContentResponse` frames over SSE (`alt=sse`). They differ in
//! URL layout and in how the credential is presented:
//!
//! | route                | endpoint                                                  | credential        |
//! |----------------------|-----------------------------------------------------------|-------------------|
//! | Gemini API           | `generativelanguage.googleapis.com/v1beta/models/..`      | `x-goog-api-key`  |
//! | Vertex AI (express)  | `aiplatform.googleapis.com/v1/publishers/google/models/..` | `x-goog-api-key`  |
//! | Vertex AI (project)  | `{location}-aiplatform.googleapis.com/v1/projects/..`     | bearer token      |

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

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const VERTEX_GLOBAL_BASE: &str = "https://aiplatform.googleapis.com/v1";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    GeminiApi,
    VertexExpress,
    VertexProject { project: String, location: String },
}

/// Gemini models behind either Google backend.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    route: Route,
    base_url: String,
    payload_limit: Option<usize>,
}

impl GeminiProvider {
    /// Gemini API, authenticated with an API key.
    pub fn gemini_api(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_route(api_key.into(), model.into(), Route::GeminiApi)
    }

    /// Vertex AI.
    ///
    /// With both `project` and `location` set, requests go to the regional
    /// project endpoint and `api_key` is sent as an OAuth bearer token. With
    /// either missing, requests use Vertex AI express mode and `api_key` is
    /// sent as an API key.
    pub fn vertex(
        api_key: impl Into<String>,
        model: impl Into<String>,
        location: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        let location = location.into();
        let project = project.into();
        let route = if location.is_empty() || project.is_empty() {
            Route::VertexExpress
        } else {
            Route::VertexProject { project, location }
        };
        Self::with_route(api_key.into(), model.into(), route)
    }

    fn with_route(api_key: String, model: String, route: Route) -> Self {
        let base_url = match &route {
            Route::GeminiApi => GEMINI_API_BASE.to_string(),
            Route::VertexExpress => VERTEX_GLOBAL_BASE.to_string(),
            Route::VertexProject { location, .. } if location == "global" => {
                VERTEX_GLOBAL_BASE.to_string()
            }
            Route::VertexProject { location, .. } => {
                format!("https://{location}-aiplatform.googleapis.com/v1")
            }
        };
        Self {
            client: Client::new(),
            api_key,
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model
            },
            route,
            base_url,
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

    /// Streaming endpoint for the configured route.
    fn endpoint(&self) -> String {
        let model_path = match &self.route {
            Route::GeminiApi => format!("models/{}", self.model),
            Route::VertexExpress => format!("publishers/google/models/{}", self.model),
            Route::VertexProject { project, location } => format!(
                "projects/{project}/locations/{location}/publishers/google/models/{}",
                self.model
            ),
        };
        format!("{}/{model_path}:streamGenerateContent?alt=sse", self.base_url)
    }

    fn build_request_body(diff: &str) -> Value {
        json!({
            "systemInstruction": {"parts": [{"text": SYSTEM_PROMPT}]},
            "contents": [{
                "role": "user",
                "parts": [{"text": user_prompt(diff)}],
            }],
        })
    }

    /// Parse one SSE `data` payload.
    fn parse_sse_event(data: &str) -> Result<Frame, ProviderError> {
        let response: GenerateContentResponse = serde_json::from_str(data)?;

        if let Some(error) = response.error {
            return Err(ProviderError::Api(format!("{}: {}", error.status, error.message)));
        }
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::Api(format!("prompt blocked: {reason}")));
        }

        let mut frame = Frame::skip();
        for candidate in response.candidates {
            if let Some(content) = candidate.content {
                frame
                    .chunks
                    .extend(content.parts.into_iter().filter_map(|p| p.text));
            }
            match candidate.finish_reason.as_deref() {
                None => {}
                Some("STOP") | Some("MAX_TOKENS") | Some("FINISH_REASON_UNSPECIFIED") => {
                    frame.done = true;
                }
                Some(other) => {
                    return Err(ProviderError::Api(format!("generation stopped: {other}")));
                }
            }
        }
        Ok(frame)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        match self.route {
            Route::GeminiApi => "gemini",
            Route::VertexExpress | Route::VertexProject { .. } => "vertex",
        }
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

        let request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&Self::build_request_body(diff));
        let request = match self.route {
            Route::VertexProject { .. } => request.bearer_auth(&self.api_key),
            Route::GeminiApi | Route::VertexExpress => {
                request.header("x-goog-api-key", &self.api_key)
            }
        };

        tracing::debug!(
            provider = self.name(),
            model = %self.model,
            diff_bytes = diff.len(),
            "gemini request"
        );
        let text =
            open_sse_stream(request, diff.len(), true, Self::parse_sse_event, &cancel).await?;
        Ok(cancellable(text, cancel))
    }
}

// -- GenerateContentResponse subset --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}
