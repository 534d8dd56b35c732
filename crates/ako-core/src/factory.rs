//! Backend selection and adapter construction.

use ako_provider::{
    AnthropicProvider, GeminiProvider, OllamaProvider, OpenAiProvider, Provider, ProviderError,
};
use reqwest::Client;

use crate::config::{BackendKind, LlmConfig, ProviderConfig, SelectedBackend};
use crate::error::GenerateError;

/// Builds a ready adapter for a selected backend.
///
/// Construction does no network I/O; connection problems surface when the
/// adapter is first asked to generate.
pub trait ClientFactory: Send + Sync {
    fn build(&self, backend: &SelectedBackend) -> Result<Box<dyn Provider>, GenerateError>;
}

/// Factory producing the HTTP adapters, all sharing one connection pool.
#[derive(Clone, Default)]
pub struct HttpClientFactory {
    client: Client,
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn require_key(kind: BackendKind, api_key: &str) -> Result<(), GenerateError> {
    if api_key.trim().is_empty() {
        return Err(ProviderError::Auth(format!("{kind}: api_key is not set")).into());
    }
    Ok(())
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, backend: &SelectedBackend) -> Result<Box<dyn Provider>, GenerateError> {
        let limit = backend.max_diff_bytes;
        let client = self.client.clone();

        let provider: Box<dyn Provider> = match &backend.provider {
            ProviderConfig::Ollama { host, model } => Box::new(
                OllamaProvider::new(host.as_str(), model.as_str())
                    .with_client(client)
                    .with_payload_limit(limit),
            ),
            ProviderConfig::Gemini { api_key, model } => {
                require_key(BackendKind::Gemini, api_key)?;
                Box::new(
                    GeminiProvider::gemini_api(api_key.as_str(), model.as_str())
                        .with_client(client)
                        .with_payload_limit(limit),
                )
            }
            ProviderConfig::Vertex {
                api_key,
                model,
                location,
                project,
            } => {
                require_key(BackendKind::Vertex, api_key)?;
                Box::new(
                    GeminiProvider::vertex(
                        api_key.as_str(),
                        model.as_str(),
                        location.as_str(),
                        project.as_str(),
                    )
                    .with_client(client)
                    .with_payload_limit(limit),
                )
            }
            ProviderConfig::Anthropic { api_key, model } => {
                require_key(BackendKind::Anthropic, api_key)?;
                Box::new(
                    AnthropicProvider::new(api_key.as_str(), model.as_str())
                        .with_client(client)
                        .with_payload_limit(limit),
                )
            }
            ProviderConfig::OpenAi { api_key, model } => {
                require_key(BackendKind::OpenAi, api_key)?;
                Box::new(
                    OpenAiProvider::new(api_key.as_str(), model.as_str())
                        .with_client(client)
                        .with_payload_limit(limit),
                )
            }
        };

        tracing::debug!(
            provider = provider.name(),
            model = provider.model(),
            "built LLM client"
        );
        Ok(provider)
    }
}

/// Pick the backend to use from `config`.
///
/// The same configuration always selects the same backend: the first enabled
/// one in [`BackendKind::PRIORITY`].
pub fn select_backend(config: Option<&LlmConfig>) -> Result<SelectedBackend, GenerateError> {
    let config = config.ok_or(GenerateError::ConfigMissing)?;
    let enabled = config.enabled_backends();
    let Some(&chosen) = enabled.first() else {
        return Err(GenerateError::NoBackendSelected);
    };

    if enabled.len() > 1 {
        let ignored: Vec<&str> = enabled[1..].iter().map(BackendKind::as_str).collect();
        tracing::warn!(
            selected = %chosen,
            ignored = ?ignored,
            "several LLM backends are enabled; using the highest priority one"
        );
    }

    Ok(config.backend(chosen))
}

/// Select a backend from `config` and build its adapter.
pub fn new_client<F>(config: Option<&LlmConfig>, factory: &F) -> Result<Box<dyn Provider>, GenerateError>
where
    F: ClientFactory + ?Sized,
{
    let backend = select_backend(config)?;
    factory.build(&backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ako_provider::ErrorKind;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Run `f` and return the warnings it logged.
    fn warnings_from(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn all_enabled() -> LlmConfig {
        let mut config = LlmConfig::initial();
        config.gemini.enable = true;
        config.gemini.api_key = "g".to_string();
        config.vertex.enable = true;
        config.vertex.api_key = "v".to_string();
        config.anthropic.enable = true;
        config.anthropic.api_key = "a".to_string();
        config.openai.enable = true;
        config.openai.api_key = "o".to_string();
        config
    }

    #[test]
    fn test_missing_config() {
        assert!(matches!(
            select_backend(None),
            Err(GenerateError::ConfigMissing)
        ));
    }

    #[test]
    fn test_nothing_enabled() {
        let config = LlmConfig::default();
        assert!(matches!(
            select_backend(Some(&config)),
            Err(GenerateError::NoBackendSelected)
        ));
    }

    #[test]
    fn test_priority_wins() {
        let mut config = all_enabled();
        assert_eq!(
            select_backend(Some(&config)).unwrap().provider.kind(),
            BackendKind::Ollama
        );

        config.ollama.enable = false;
        config.gemini.enable = false;
        assert_eq!(
            select_backend(Some(&config)).unwrap().provider.kind(),
            BackendKind::Vertex
        );
    }

    #[test]
    fn test_several_enabled_logs_ignored_backends() {
        let mut config = all_enabled();
        config.ollama.enable = false;
        config.vertex.enable = false;

        let logs = warnings_from(|| {
            let selected = select_backend(Some(&config)).unwrap();
            assert_eq!(selected.provider.kind(), BackendKind::Gemini);
        });
        assert!(logs.contains("several LLM backends are enabled"), "{logs}");
        assert!(logs.contains("selected=gemini"), "{logs}");
        assert!(logs.contains("\"anthropic\""), "{logs}");
        assert!(logs.contains("\"openai\""), "{logs}");
        assert!(!logs.contains("\"vertex\""), "{logs}");
    }

    #[test]
    fn test_single_enabled_logs_nothing() {
        let config = LlmConfig::initial();
        let logs = warnings_from(|| {
            select_backend(Some(&config)).unwrap();
        });
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let mut config = all_enabled();
        config.ollama.enable = false;
        let first = select_backend(Some(&config)).unwrap();
        for _ in 0..100 {
            assert_eq!(select_backend(Some(&config)).unwrap(), first);
        }
    }

    #[test]
    fn test_build_each_backend() {
        let factory = HttpClientFactory::new();
        let config = all_enabled();
        let expected = [
            (BackendKind::Ollama, "ollama"),
            (BackendKind::Gemini, "gemini"),
            (BackendKind::Vertex, "vertex"),
            (BackendKind::Anthropic, "anthropic"),
            (BackendKind::OpenAi, "openai"),
        ];
        for (kind, name) in expected {
            let provider = factory.build(&config.backend(kind)).unwrap();
            assert_eq!(provider.name(), name);
            assert!(!provider.model().is_empty());
        }
    }

    #[test]
    fn test_missing_key_is_auth_error() {
        let mut config = LlmConfig::default();
        config.anthropic.enable = true;

        let err = match new_client(Some(&config), &HttpClientFactory::new()) {
            Err(err) => err,
            Ok(_) => panic!("expected missing key to fail"),
        };
        match err {
            GenerateError::Provider(inner) => assert_eq!(inner.kind(), ErrorKind::Auth),
            other => panic!("Expected auth error, got: {other:?}"),
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = LlmConfig::initial();
        let provider = new_client(Some(&config), &HttpClientFactory::new()).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "gemma3:1b");
    }
}
