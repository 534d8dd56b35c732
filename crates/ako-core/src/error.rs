//! Error types for the ako-core crate.

use ako_provider::ProviderError;
use std::path::PathBuf;

/// Failure of a commit message generation request.
///
/// Selection failures and backend failures stay distinguishable: the first two
/// variants never involve the network.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// No configuration document was loaded.
    #[error("LLM configuration not found; run `ako init` to create one")]
    ConfigMissing,

    /// The configuration enables no backend.
    #[error("No LLM backend is enabled in the configuration")]
    NoBackendSelected,

    /// The selected backend failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl GenerateError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, GenerateError::Provider(ProviderError::Canceled))
    }
}

/// Errors reading or writing the configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yml::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[source] serde_yml::Error),
}
