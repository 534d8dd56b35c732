use ako_provider::providers::ollama;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::error::ConfigError;

/// Location of the configuration document, relative to the repository root.
pub const DEFAULT_CONFIG_PATH: &str = ".ako/llm.config.yaml";

/// The five supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Ollama,
    Gemini,
    Vertex,
    Anthropic,
    OpenAi,
}

impl BackendKind {
    /// Selection priority. When several backends are enabled, the first one
    /// in this list is used.
    pub const PRIORITY: [BackendKind; 5] = [
        BackendKind::Ollama,
        BackendKind::Gemini,
        BackendKind::Vertex,
        BackendKind::Anthropic,
        BackendKind::OpenAi,
    ];

    /// Key of the backend's section in the configuration document.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Gemini => "gemini",
            BackendKind::Vertex => "vertex",
            BackendKind::Anthropic => "anthropic",
            BackendKind::OpenAi => "openai",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters of one backend, carrying only what it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    /// Local inference server.
    Ollama { host: String, model: String },
    /// Gemini API, keyed.
    Gemini { api_key: String, model: String },
    /// Gemini hosted on Vertex AI.
    Vertex {
        api_key: String,
        model: String,
        location: String,
        project: String,
    },
    Anthropic { api_key: String, model: String },
    OpenAi { api_key: String, model: String },
}

impl ProviderConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            ProviderConfig::Ollama { .. } => BackendKind::Ollama,
            ProviderConfig::Gemini { .. } => BackendKind::Gemini,
            ProviderConfig::Vertex { .. } => BackendKind::Vertex,
            ProviderConfig::Anthropic { .. } => BackendKind::Anthropic,
            ProviderConfig::OpenAi { .. } => BackendKind::OpenAi,
        }
    }
}

/// The backend chosen from a configuration, plus its payload guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedBackend {
    pub provider: ProviderConfig,
    /// Diffs longer than this many bytes are rejected before any request.
    pub max_diff_bytes: Option<usize>,
}

/// `ollama:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSection {
    pub enable: bool,
    pub host: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_diff_bytes: Option<usize>,
}

/// Section shape shared by the key-authenticated backends
/// (`gemini:`, `anthropic:`, `openai:`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySection {
    pub enable: bool,
    pub model: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_diff_bytes: Option<usize>,
}

/// `vertex:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexSection {
    pub enable: bool,
    pub model: String,
    pub api_key: String,
    pub location: String,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_diff_bytes: Option<usize>,
}

/// Serialized settings from `.ako/llm.config.yaml`.
///
/// Missing sections and fields read as disabled / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub ollama: OllamaSection,
    pub gemini: KeySection,
    pub vertex: VertexSection,
    pub anthropic: KeySection,
    pub openai: KeySection,
}

impl LlmConfig {
    /// The document `ako init` writes: local Ollama, enabled.
    pub fn initial() -> Self {
        Self {
            ollama: OllamaSection {
                enable: true,
                host: ollama::DEFAULT_HOST.to_string(),
                model: ollama::DEFAULT_MODEL.to_string(),
                max_diff_bytes: None,
            },
            ..Default::default()
        }
    }

    pub fn is_enabled(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Ollama => self.ollama.enable,
            BackendKind::Gemini => self.gemini.enable,
            BackendKind::Vertex => self.vertex.enable,
            BackendKind::Anthropic => self.anthropic.enable,
            BackendKind::OpenAi => self.openai.enable,
        }
    }

    /// Enabled backends, in selection priority order.
    pub fn enabled_backends(&self) -> Vec<BackendKind> {
        BackendKind::PRIORITY
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }

    /// Connection parameters for `kind`, whether or not it is enabled.
    pub fn backend(&self, kind: BackendKind) -> SelectedBackend {
        let (provider, max_diff_bytes) = match kind {
            BackendKind::Ollama => (
                ProviderConfig::Ollama {
                    host: self.ollama.host.clone(),
                    model: self.ollama.model.clone(),
                },
                self.ollama.max_diff_bytes,
            ),
            BackendKind::Gemini => (
                ProviderConfig::Gemini {
                    api_key: self.gemini.api_key.clone(),
                    model: self.gemini.model.clone(),
                },
                self.gemini.max_diff_bytes,
            ),
            BackendKind::Vertex => (
                ProviderConfig::Vertex {
                    api_key: self.vertex.api_key.clone(),
                    model: self.vertex.model.clone(),
                    location: self.vertex.location.clone(),
                    project: self.vertex.project.clone(),
                },
                self.vertex.max_diff_bytes,
            ),
            BackendKind::Anthropic => (
                ProviderConfig::Anthropic {
                    api_key: self.anthropic.api_key.clone(),
                    model: self.anthropic.model.clone(),
                },
                self.anthropic.max_diff_bytes,
            ),
            BackendKind::OpenAi => (
                ProviderConfig::OpenAi {
                    api_key: self.openai.api_key.clone(),
                    model: self.openai.model.clone(),
                },
                self.openai.max_diff_bytes,
            ),
        };
        SelectedBackend {
            provider,
            max_diff_bytes,
        }
    }
}

/// Loads and saves the configuration document, caching the first load.
pub struct ConfigStore {
    path: PathBuf,
    resolved: OnceLock<Option<Arc<LlmConfig>>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Store at [`DEFAULT_CONFIG_PATH`], relative to the working directory.
    pub fn new() -> Self {
        Self::at(DEFAULT_CONFIG_PATH)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resolved: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and parse the document. Not cached.
    pub fn load(&self) -> Result<LlmConfig, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                ConfigError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        // An empty file is a valid, all-disabled document.
        if content.trim().is_empty() {
            return Ok(LlmConfig::default());
        }

        serde_yml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// The configuration for this process, loaded on first call.
    ///
    /// Returns `None` when the document is missing or unreadable; the reason
    /// is logged. Later calls return the same value without touching disk.
    pub fn resolve(&self) -> Option<Arc<LlmConfig>> {
        self.resolved
            .get_or_init(|| match self.load() {
                Ok(config) => Some(Arc::new(config)),
                Err(err @ ConfigError::NotFound { .. }) => {
                    tracing::debug!(error = %err, "LLM configuration unavailable");
                    None
                }
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring unreadable LLM configuration");
                    None
                }
            })
            .clone()
    }

    /// Write `config` to disk, creating the parent directory.
    pub fn save(&self, config: &LlmConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_yml::to_string(config).map_err(ConfigError::Serialize)?;
        fs::write(&self.path, content).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Write the first-run document and return it.
    pub fn init(&self) -> Result<LlmConfig, ConfigError> {
        let config = LlmConfig::initial();
        self.save(&config)?;
        tracing::info!(path = %self.path.display(), "wrote default LLM configuration");
        Ok(config)
    }
}
