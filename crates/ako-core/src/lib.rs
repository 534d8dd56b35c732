//! ako-core: backend selection and streaming commit message generation.

pub mod config;
mod error;
pub mod factory;
pub mod generate;

pub use config::{
    BackendKind, ConfigStore, LlmConfig, ProviderConfig, SelectedBackend, DEFAULT_CONFIG_PATH,
};
pub use error::{ConfigError, GenerateError};
pub use factory::{new_client, select_backend, ClientFactory, HttpClientFactory};
pub use generate::{
    collect_message, generate_commit_message, CommitMessageStream, Generator, RequestState,
};
