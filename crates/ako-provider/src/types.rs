//! Common types used by the provider trait and implementations.

use crate::error::ProviderError;
use futures::stream::BoxStream;

/// Ordered text fragments of an in-progress response.
///
/// The stream is finite and not restartable. It ends after the backend signals
/// completion, or right after the first `Err` item.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// What a backend frame decoded into.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Frame {
    /// Text fragments carried by the frame, in order.
    pub chunks: Vec<String>,
    /// Whether the backend marked the response as complete.
    pub done: bool,
}

impl Frame {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self {
            chunks: vec![text.into()],
            done: false,
        }
    }

    pub(crate) fn done() -> Self {
        Self {
            chunks: Vec::new(),
            done: true,
        }
    }

    pub(crate) fn skip() -> Self {
        Self::default()
    }
}
