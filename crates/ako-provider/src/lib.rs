//! ako-provider: LLM backend adapters that stream commit messages.

mod error;
pub mod prompt;
pub mod providers;
mod stream;
pub mod traits;
pub mod types;

pub use error::{ErrorKind, ProviderError};
pub use stream::cancellable;
pub use providers::{AnthropicProvider, GeminiProvider, OllamaProvider, OpenAiProvider};
pub use traits::Provider;
pub use types::TextStream;
