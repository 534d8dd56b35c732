//! Error types for the ako-provider crate.

use reqwest::StatusCode;

/// Errors that can occur while generating text through a backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The backend could not be reached, or the transport failed mid-stream.
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    /// The credential was rejected or is missing.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The backend answered with an error payload.
    #[error("API error: {0}")]
    Api(String),

    /// A frame from the backend could not be decoded.
    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The backend closed the stream without signalling completion.
    #[error("Stream closed before the backend finished the response")]
    Truncated,

    /// The diff is larger than the backend accepts.
    #[error("Payload of {size} bytes exceeds the backend limit")]
    PayloadTooLarge { size: usize },

    /// The caller canceled the request.
    #[error("Generation canceled")]
    Canceled,
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Auth,
    Provider,
    Canceled,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Connection(_) => ErrorKind::Connection,
            ProviderError::Auth(_) => ErrorKind::Auth,
            ProviderError::Api(_)
            | ProviderError::Malformed(_)
            | ProviderError::Truncated
            | ProviderError::PayloadTooLarge { .. } => ErrorKind::Provider,
            ProviderError::Canceled => ErrorKind::Canceled,
        }
    }

    /// Classify a non-success HTTP status and its body.
    ///
    /// `size` is the length of the diff that was sent, reported back on 413.
    pub(crate) fn from_status(status: StatusCode, body: String, size: usize) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProviderError::Auth(format!("HTTP {status}: {body}"))
            }
            StatusCode::PAYLOAD_TOO_LARGE => ProviderError::PayloadTooLarge { size },
            // Gemini reports a bad key as 400 INVALID_ARGUMENT.
            StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => {
                ProviderError::Auth(format!("HTTP {status}: {body}"))
            }
            _ => ProviderError::Api(format!("HTTP {status}: {body}")),
        }
    }
}
