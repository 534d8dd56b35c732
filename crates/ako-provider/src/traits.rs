//! Provider trait definition.

use crate::error::ProviderError;
use crate::types::TextStream;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Trait for LLM backend adapters.
///
/// Each adapter speaks one backend's wire protocol (Ollama, Gemini, Vertex AI,
/// Anthropic, OpenAI) and normalizes its streamed output into a [`TextStream`].
/// Callers never branch on which adapter they hold.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name (e.g., "anthropic", "ollama").
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Generate a commit message for `diff`.
    ///
    /// The returned stream yields fragments as the backend produces them.
    /// Canceling `cancel` ends the stream with [`ProviderError::Canceled`] and
    /// closes the connection. Constructing an adapter never touches the
    /// network; the first I/O happens here or on the first poll.
    async fn generate(
        &self,
        diff: &str,
        cancel: CancellationToken,
    ) -> Result<TextStream, ProviderError>;
}

// Compile-time check: Provider must be object-safe
const _: () = {
    fn _assert_object_safe(_: &dyn Provider) {}
};
