//! Streaming orchestration of one commit message request.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use ako_provider::{cancellable, Provider, ProviderError, TextStream};
use futures::stream::{self, FusedStream, Stream, StreamExt};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::LlmConfig;
use crate::error::GenerateError;
use crate::factory::{new_client, ClientFactory, HttpClientFactory};

/// Lifecycle of a single generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    /// Selecting a backend and building its client.
    Resolving,
    /// Request sent, no chunk received yet.
    Dispatched,
    Streaming,
    Completed,
    Failed,
    Canceled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Canceled
        )
    }
}

/// Runs generation requests against the backend a configuration selects.
///
/// Holds no per-request state, so one generator can serve concurrent calls.
#[derive(Clone, Default)]
pub struct Generator<F = HttpClientFactory> {
    factory: F,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: ClientFactory> Generator<F> {
    pub fn with_factory(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Start generating a commit message for `diff`.
    ///
    /// Selection, client construction and dispatch failures are returned
    /// here. Failures after the first byte arrive as the stream's last item.
    /// Canceling `cancel` (or dropping the returned stream) closes the backend
    /// connection.
    pub async fn generate_commit_message(
        &self,
        config: Option<&LlmConfig>,
        diff: &str,
        cancel: &CancellationToken,
    ) -> Result<CommitMessageStream, GenerateError> {
        let mut state = RequestState::Idle;
        transition(&mut state, RequestState::Resolving);
        let client = new_client(config, &self.factory)?;

        let token = cancel.child_token();
        tracing::debug!(
            provider = client.name(),
            model = client.model(),
            diff_bytes = diff.len(),
            "dispatching commit message request"
        );
        let inner = match client.generate(diff, token.clone()).await {
            Ok(inner) => inner,
            Err(err) => {
                tracing::debug!(provider = client.name(), error = %err, "dispatch failed");
                return Err(err.into());
            }
        };
        transition(&mut state, RequestState::Dispatched);

        Ok(CommitMessageStream {
            inner: cancellable(inner, token.clone()),
            state,
            token: token.clone(),
            client,
            _guard: token.drop_guard(),
        })
    }
}

/// [`Generator::generate_commit_message`] with the HTTP client factory.
pub async fn generate_commit_message(
    config: Option<&LlmConfig>,
    diff: &str,
    cancel: &CancellationToken,
) -> Result<CommitMessageStream, GenerateError> {
    Generator::new()
        .generate_commit_message(config, diff, cancel)
        .await
}

/// Concatenate a stream into the full message.
///
/// Any error ends collection; partial text is discarded.
pub async fn collect_message(mut stream: CommitMessageStream) -> Result<String, GenerateError> {
    let mut message = String::new();
    while let Some(chunk) = stream.next().await {
        message.push_str(&chunk?);
    }
    Ok(message)
}

fn transition(state: &mut RequestState, next: RequestState) {
    tracing::trace!(from = ?*state, to = ?next, "request state");
    *state = next;
}

/// Text chunks of a commit message, in the order the backend produced them.
///
/// Owns the backend client and its connection. Yields `None` for good once the
/// request completes, fails or is canceled.
pub struct CommitMessageStream {
    inner: TextStream,
    state: RequestState,
    token: CancellationToken,
    client: Box<dyn Provider>,
    _guard: DropGuard,
}

impl CommitMessageStream {
    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn provider(&self) -> &str {
        self.client.name()
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Cancel the request. The next poll yields the cancellation error.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    fn finish(&mut self, state: RequestState) {
        transition(&mut self.state, state);
        // Release the connection now rather than when the caller drops us.
        self.inner = stream::empty().boxed();
    }
}

impl Stream for CommitMessageStream {
    type Item = Result<String, GenerateError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.state.is_terminal() {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                if this.state != RequestState::Streaming {
                    transition(&mut this.state, RequestState::Streaming);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                let state = match err {
                    ProviderError::Canceled => RequestState::Canceled,
                    _ => RequestState::Failed,
                };
                tracing::debug!(provider = this.client.name(), error = %err, "generation ended");
                this.finish(state);
                Poll::Ready(Some(Err(err.into())))
            }
            Poll::Ready(None) => {
                this.finish(RequestState::Completed);
                Poll::Ready(None)
            }
        }
    }
}

impl FusedStream for CommitMessageStream {
    fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}

impl fmt::Debug for CommitMessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitMessageStream")
            .field("provider", &self.client.name())
            .field("model", &self.client.model())
            .field("state", &self.state)
            .finish()
    }
}
