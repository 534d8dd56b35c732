//! Stream plumbing shared by the adapters.
//!
//! Backends speak either server-sent events (Gemini, Vertex AI, Anthropic,
//! OpenAI) or newline-delimited JSON (Ollama). Both decoders turn raw frames
//! into a [`TextStream`] through an adapter-supplied `decode` function and stop
//! at the first error. [`cancellable`] wraps either one so a canceled token
//! drops the connection between two chunks.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};
use futures::FutureExt;
use reqwest::RequestBuilder;
use reqwest_eventsource::{retry, Error as SseError, Event, EventSource};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::types::{Frame, TextStream};

/// Reject a diff that exceeds an adapter's configured limit.
pub(crate) fn check_payload(diff: &str, limit: Option<usize>) -> Result<(), ProviderError> {
    match limit {
        Some(limit) if diff.len() > limit => Err(ProviderError::PayloadTooLarge { size: diff.len() }),
        _ => Ok(()),
    }
}

/// End `inner` with [`ProviderError::Canceled`] once `cancel` fires.
///
/// The inner stream (and with it the HTTP connection) is dropped as soon as
/// the cancellation is observed, not when the caller drops the wrapper.
pub fn cancellable(inner: TextStream, cancel: CancellationToken) -> TextStream {
    stream::unfold(Some((inner, cancel)), |state| async move {
        let Some((mut inner, cancel)) = state else {
            return None;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // A response that already ended is complete, not canceled.
                if let Some(None) = inner.next().now_or_never() {
                    return None;
                }
                tracing::debug!("generation canceled, closing backend stream");
                Some((Err(ProviderError::Canceled), None))
            }
            item = inner.next() => match item {
                Some(Ok(chunk)) => Some((Ok(chunk), Some((inner, cancel)))),
                Some(Err(err)) => Some((Err(err), None)),
                None => None,
            },
        }
    })
    .boxed()
}

/// Open an SSE source that never reconnects on its own.
fn event_source(request: RequestBuilder) -> Result<EventSource, ProviderError> {
    let mut source = EventSource::new(request)
        .map_err(|_| ProviderError::Api("request body cannot be replayed".to_string()))?;
    source.set_retry_policy(Box::new(retry::Never));
    Ok(source)
}

/// Send `request` and wait until the backend accepted it.
///
/// Transport failures and error statuses are returned here, before any text
/// is streamed, so SSE backends fail at dispatch the same way Ollama does.
/// The returned stream decodes events as [`sse_text_stream`] describes.
pub(crate) async fn open_sse_stream<F>(
    request: RequestBuilder,
    payload_size: usize,
    require_done: bool,
    mut decode: F,
    cancel: &CancellationToken,
) -> Result<TextStream, ProviderError>
where
    F: FnMut(&str) -> Result<Frame, ProviderError> + Send + 'static,
{
    let mut source = event_source(request)?;

    let first = loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                source.close();
                return Err(ProviderError::Canceled);
            }
            event = source.next() => event,
        };
        match event {
            Some(Ok(Event::Open)) => break Frame::skip(),
            Some(Ok(Event::Message(message))) => match decode(&message.data) {
                Ok(frame) => break frame,
                Err(err) => {
                    source.close();
                    return Err(err);
                }
            },
            Some(Err(SseError::StreamEnded)) | None => {
                source.close();
                if require_done {
                    return Err(ProviderError::Truncated);
                }
                return Ok(stream::empty().boxed());
            }
            Some(Err(err)) => {
                source.close();
                return Err(classify_sse_error(err, payload_size).await);
            }
        }
    };

    Ok(sse_text_stream(source, payload_size, require_done, decode, first))
}

struct SseDecoder<F> {
    source: EventSource,
    decode: F,
    pending: VecDeque<String>,
    finished: bool,
    require_done: bool,
    payload_size: usize,
}

impl<F> SseDecoder<F> {
    fn finish(&mut self) {
        self.finished = true;
        self.source.close();
    }

    fn fail(&mut self) {
        self.pending.clear();
        self.finish();
    }
}

/// Decode an SSE source into text chunks, starting with `first`.
///
/// `decode` maps one event's `data` field to a [`Frame`]. With `require_done`,
/// a stream that ends before a frame reported `done` yields
/// [`ProviderError::Truncated`]. `payload_size` is reported back if the
/// backend answers 413.
fn sse_text_stream<F>(
    mut source: EventSource,
    payload_size: usize,
    require_done: bool,
    decode: F,
    first: Frame,
) -> TextStream
where
    F: FnMut(&str) -> Result<Frame, ProviderError> + Send + 'static,
{
    if first.done {
        source.close();
    }
    let decoder = SseDecoder {
        source,
        decode,
        pending: first.chunks.into_iter().filter(|c| !c.is_empty()).collect(),
        finished: first.done,
        require_done,
        payload_size,
    };

    stream::unfold(decoder, |mut d| async move {
        loop {
            if let Some(chunk) = d.pending.pop_front() {
                return Some((Ok(chunk), d));
            }
            if d.finished {
                return None;
            }

            match d.source.next().await {
                Some(Ok(Event::Open)) => {}
                Some(Ok(Event::Message(message))) => match (d.decode)(&message.data) {
                    Ok(frame) => {
                        d.pending
                            .extend(frame.chunks.into_iter().filter(|c| !c.is_empty()));
                        if frame.done {
                            d.finish();
                        }
                    }
                    Err(err) => {
                        d.fail();
                        return Some((Err(err), d));
                    }
                },
                Some(Err(SseError::StreamEnded)) | None => {
                    d.finish();
                    if d.require_done {
                        return Some((Err(ProviderError::Truncated), d));
                    }
                }
                Some(Err(err)) => {
                    d.fail();
                    let err = classify_sse_error(err, d.payload_size).await;
                    return Some((Err(err), d));
                }
            }
        }
    })
    .boxed()
}

async fn classify_sse_error(err: SseError, payload_size: usize) -> ProviderError {
    match err {
        SseError::Transport(err) if err.is_builder() => {
            ProviderError::Api(format!("invalid request: {err}"))
        }
        SseError::Transport(err) => ProviderError::Connection(err),
        SseError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            ProviderError::from_status(status, body, payload_size)
        }
        SseError::InvalidContentType(content_type, response) => {
            let body = response.text().await.unwrap_or_default();
            ProviderError::Api(format!(
                "expected an event stream, got {content_type:?}: {body}"
            ))
        }
        other => ProviderError::Api(other.to_string()),
    }
}

struct LineDecoder<S, F> {
    bytes: S,
    decode: F,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    eof: bool,
    finished: bool,
}

impl<S, F> LineDecoder<S, F> {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        Some(self.buffer.drain(..=pos).collect())
    }

    fn fail(&mut self) {
        self.pending.clear();
        self.finished = true;
    }
}

/// Decode a newline-delimited JSON body into text chunks.
///
/// The backend must send a frame with `done` set; running out of bytes first
/// yields [`ProviderError::Truncated`].
pub(crate) fn ndjson_text_stream<S, B, F>(bytes: S, decode: F) -> TextStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    F: FnMut(&[u8]) -> Result<Frame, ProviderError> + Send + 'static,
{
    let decoder = LineDecoder {
        bytes,
        decode,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        eof: false,
        finished: false,
    };

    stream::unfold(decoder, |mut d| async move {
        loop {
            if let Some(chunk) = d.pending.pop_front() {
                return Some((Ok(chunk), d));
            }
            if d.finished {
                return None;
            }

            if let Some(line) = d.next_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match (d.decode)(&line) {
                    Ok(frame) => {
                        d.pending
                            .extend(frame.chunks.into_iter().filter(|c| !c.is_empty()));
                        d.finished = frame.done;
                    }
                    Err(err) => {
                        d.fail();
                        return Some((Err(err), d));
                    }
                }
                continue;
            }

            if d.eof {
                d.fail();
                return Some((Err(ProviderError::Truncated), d));
            }

            match d.bytes.next().await {
                Some(Ok(bytes)) => d.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(err)) => {
                    d.fail();
                    return Some((Err(ProviderError::Connection(err)), d));
                }
                None => {
                    d.eof = true;
                    // Flush a final line that lacks its newline.
                    if !d.buffer.is_empty() {
                        d.buffer.push(b'\n');
                    }
                }
            }
        }
    })
    .boxed()
}
