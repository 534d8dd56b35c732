//! Adapter tests against stub HTTP backends.
//!
//! Every backend streams the same three fragments so the five adapters can be
//! checked against one expectation.

use std::time::Duration;

use ako_provider::*;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXPECTED: [&str; 3] = ["fix", " bug", " #42"];

async fn drain(mut stream: TextStream) -> (Vec<String>, Option<ProviderError>) {
    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => chunks.push(chunk),
            Err(err) => {
                assert!(stream.next().await.is_none(), "stream continued after an error");
                return (chunks, Some(err));
            }
        }
    }
    (chunks, None)
}

fn sse(events: &[String]) -> String {
    events.iter().map(|e| format!("data: {e}\n\n")).collect()
}

fn anthropic_body() -> String {
    let mut events = vec![
        r#"{"type":"message_start","message":{"usage":{"input_tokens":10,"output_tokens":1}}}"#
            .to_string(),
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#
            .to_string(),
    ];
    for chunk in EXPECTED {
        events.push(
            serde_json::json!({
                "type": "content_block_delta",
                "index": 0,
                "delta": {"type": "text_delta", "text": chunk},
            })
            .to_string(),
        );
    }
    events.push(r#"{"type":"content_block_stop","index":0}"#.to_string());
    events.push(r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#.to_string());
    events.push(r#"{"type":"message_stop"}"#.to_string());
    sse(&events)
}

fn openai_events() -> Vec<String> {
    let mut events =
        vec![r#"{"choices":[{"delta":{"role":"assistant","content":""},"index":0}]}"#.to_string()];
    for chunk in EXPECTED {
        events.push(
            serde_json::json!({"choices": [{"delta": {"content": chunk}, "index": 0}]}).to_string(),
        );
    }
    events.push(r#"{"choices":[{"delta":{},"finish_reason":"stop","index":0}]}"#.to_string());
    events
}

fn gemini_body() -> String {
    let last = EXPECTED.len() - 1;
    let events: Vec<String> = EXPECTED
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let mut candidate = serde_json::json!({
                "content": {"role": "model", "parts": [{"text": chunk}]},
                "index": 0,
            });
            if i == last {
                candidate["finishReason"] = "STOP".into();
            }
            serde_json::json!({"candidates": [candidate]}).to_string()
        })
        .collect();
    sse(&events)
}

fn ollama_body() -> String {
    let mut lines: Vec<String> = EXPECTED
        .iter()
        .map(|chunk| {
            serde_json::json!({
                "model": "gemma3:1b",
                "message": {"role": "assistant", "content": chunk},
                "done": false,
            })
            .to_string()
        })
        .collect();
    lines.push(
        r#"{"model":"gemma3:1b","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop"}"#
            .to_string(),
    );
    lines.join("\n") + "\n"
}

fn event_stream(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

async fn assert_expected(provider: &dyn Provider, diff: &str) {
    let stream = provider
        .generate(diff, CancellationToken::new())
        .await
        .expect("generate");
    let (chunks, err) = drain(stream).await;
    assert!(err.is_none(), "{}: unexpected error {err:?}", provider.name());
    assert_eq!(chunks, EXPECTED);
    assert_eq!(chunks.concat(), "fix bug #42");
}

#[tokio::test]
async fn test_ollama_streams_chunks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ollama_body(), "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "gemma3:1b");
    assert_expected(&provider, "diff --git a/x b/x").await;
}

#[tokio::test]
async fn test_gemini_api_streams_chunks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "g-key"))
        .respond_with(event_stream(gemini_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GeminiProvider::gemini_api("g-key", "gemini-2.0-flash").with_base_url(server.uri());
    assert_expected(&provider, "diff").await;
}

#[tokio::test]
async fn test_vertex_streams_chunks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(
            "/projects/my-proj/locations/us-central1/publishers/google/models/gemini-2.0-flash:streamGenerateContent",
        ))
        .and(header("authorization", "Bearer v-token"))
        .respond_with(event_stream(gemini_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GeminiProvider::vertex("v-token", "gemini-2.0-flash", "us-central1", "my-proj")
        .with_base_url(server.uri());
    assert_expected(&provider, "diff").await;
}

#[tokio::test]
async fn test_anthropic_streams_chunks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "a-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(event_stream(anthropic_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("a-key", "").with_base_url(server.uri());
    assert_expected(&provider, "diff").await;
}

#[tokio::test]
async fn test_openai_streams_chunks_in_order() {
    let server = MockServer::start().await;
    let mut events = openai_events();
    events.push("[DONE]".to_string());
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer o-key"))
        .respond_with(event_stream(sse(&events)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("o-key", "").with_base_url(server.uri());
    assert_expected(&provider, "diff").await;
}

#[tokio::test]
async fn test_empty_diff_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ollama_body(), "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "");
    assert_expected(&provider, "").await;
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        ))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("bad", "").with_base_url(server.uri());
    let err = dispatch_error(&provider).await;
    assert_eq!(err.kind(), ErrorKind::Auth);
}

#[tokio::test]
async fn test_gemini_invalid_key_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string(
            r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#,
        ))
        .mount(&server)
        .await;

    let provider = GeminiProvider::gemini_api("bad", "").with_base_url(server.uri());
    assert!(matches!(dispatch_error(&provider).await, ProviderError::Auth(_)));
}

#[tokio::test]
async fn test_payload_too_large_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(413).set_body_string("request entity too large"))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("k", "").with_base_url(server.uri());
    let result = provider.generate("0123456789", CancellationToken::new()).await;
    assert!(matches!(result, Err(ProviderError::PayloadTooLarge { size: 10 })));
}

#[tokio::test]
async fn test_payload_limit_rejects_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ollama_body(), "application/x-ndjson"))
        .expect(0)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "").with_payload_limit(16);
    let diff = "x".repeat(17);
    let result = provider.generate(&diff, CancellationToken::new()).await;
    assert!(matches!(result, Err(ProviderError::PayloadTooLarge { size: 17 })));
}

#[tokio::test]
async fn test_ollama_missing_model_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(404).set_body_string(r#"{"error":"model \"nope\" not found"}"#),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "nope");
    let err = provider
        .generate("diff", CancellationToken::new())
        .await
        .err()
        .expect("error");
    assert_eq!(err.kind(), ErrorKind::Provider);
    assert!(err.to_string().contains("not found"));
}

/// One adapter of each kind, all pointed at `base`.
fn all_adapters(base: &str) -> Vec<Box<dyn Provider>> {
    vec![
        Box::new(OllamaProvider::new(base, "")),
        Box::new(GeminiProvider::gemini_api("k", "").with_base_url(base)),
        Box::new(GeminiProvider::vertex("k", "", "us-central1", "p").with_base_url(base)),
        Box::new(AnthropicProvider::new("k", "").with_base_url(base)),
        Box::new(OpenAiProvider::new("k", "").with_base_url(base)),
    ]
}

async fn dispatch_error(provider: &dyn Provider) -> ProviderError {
    match provider.generate("diff", CancellationToken::new()).await {
        Ok(_) => panic!("{}: expected generate to fail", provider.name()),
        Err(err) => err,
    }
}

#[tokio::test]
async fn test_unreachable_backend_fails_at_dispatch() {
    for provider in all_adapters("http://127.0.0.1:1") {
        let err = dispatch_error(provider.as_ref()).await;
        assert_eq!(err.kind(), ErrorKind::Connection, "{}: {err}", provider.name());
    }
}

#[tokio::test]
async fn test_rejected_credential_fails_at_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .expect(5)
        .mount(&server)
        .await;

    for provider in all_adapters(&server.uri()) {
        let err = dispatch_error(provider.as_ref()).await;
        assert_eq!(err.kind(), ErrorKind::Auth, "{}: {err}", provider.name());
    }
}

#[tokio::test]
async fn test_stream_without_completion_marker_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(event_stream(sse(&openai_events())))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("k", "").with_base_url(server.uri());
    let stream = provider.generate("diff", CancellationToken::new()).await.unwrap();
    let (chunks, err) = drain(stream).await;
    assert_eq!(chunks, EXPECTED);
    assert!(matches!(err, Some(ProviderError::Truncated)));
}

#[tokio::test]
async fn test_mid_stream_error_event_halts() {
    let server = MockServer::start().await;
    let body = sse(&[
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"fix"}}"#
            .to_string(),
        r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
            .to_string(),
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" bug"}}"#
            .to_string(),
    ]);
    Mock::given(method("POST"))
        .respond_with(event_stream(body))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("k", "").with_base_url(server.uri());
    let stream = provider.generate("diff", CancellationToken::new()).await.unwrap();
    let (chunks, err) = drain(stream).await;
    assert_eq!(chunks, vec!["fix"]);
    assert!(matches!(err, Some(ProviderError::Api(msg)) if msg.contains("overloaded_error")));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(ollama_body(), "application/x-ndjson")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri(), "");
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), provider.generate("diff", token))
        .await
        .expect("cancellation observed");
    assert!(matches!(result, Err(ProviderError::Canceled)));
}

#[tokio::test]
async fn test_cancel_sse_while_waiting_for_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(event_stream(anthropic_body()).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("k", "").with_base_url(server.uri());
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), provider.generate("diff", token))
        .await
        .expect("cancellation observed");
    assert!(matches!(result, Err(ProviderError::Canceled)));
}

#[tokio::test]
async fn test_cancel_after_open_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(event_stream(anthropic_body()))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("k", "").with_base_url(server.uri());
    let token = CancellationToken::new();
    let mut stream = provider.generate("diff", token.clone()).await.unwrap();
    token.cancel();

    let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("cancellation observed");
    assert!(matches!(next, Some(Err(ProviderError::Canceled))));
    assert!(stream.next().await.is_none());
}
