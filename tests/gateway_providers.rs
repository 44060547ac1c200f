use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use longguide::gateway::anthropic::AnthropicAdapter;
use longguide::gateway::openai::OpenAiAdapter;
use longguide::gateway::{
    ChatProvider, ChatRequest, FinishReason, GatewayConfig, GenerateOptions, Message,
    ModelGateway, NoopUsageSink, ProviderError, ProviderKind,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![Message::user("hi")])
        .temperature(0.7)
        .max_tokens(512)
}

#[tokio::test]
async fn openai_parses_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini", "max_tokens": 512 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "content": "hello" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 20 }
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap();
    let resp = adapter.chat(&request("gpt-4o-mini")).await.unwrap();

    assert_eq!(resp.content, "hello");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    assert_eq!(resp.input_tokens, 10);
    assert_eq!(resp.output_tokens, 20);
}

#[tokio::test]
async fn openai_classifies_429_as_rate_limit_with_context() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-request-id", "req-42")
                .set_body_json(json!({
                    "error": { "message": "slow down", "code": "rate_limit_exceeded" }
                })),
        )
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap();
    let err = adapter.chat(&request("gpt-4o-mini")).await.unwrap_err();

    match err {
        ProviderError::RateLimited {
            retry_after,
            context,
        } => {
            assert_eq!(retry_after, Duration::from_secs(60));
            let ctx = context.expect("expected error context");
            assert_eq!(ctx.http_status, Some(429));
            assert_eq!(ctx.provider_code.as_deref(), Some("rate_limit_exceeded"));
            assert_eq!(ctx.request_id.as_deref(), Some("req-42"));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn openai_server_errors_are_retryable_client_errors_are_not() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-broken" })))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-unknown" })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "model not found", "code": "model_not_found" }
        })))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap();

    let err = adapter.chat(&request("gpt-broken")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Provider { retryable: true, .. }));
    assert!(err.is_transient());

    let err = adapter.chat(&request("gpt-unknown")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Provider { retryable: false, .. }));
    assert_eq!(err.context().and_then(|c| c.provider_code.as_deref()), Some("model_not_found"));
}

#[tokio::test]
async fn anthropic_parses_text_block_and_sends_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-haiku",
            "max_tokens": 512,
            "messages": [{ "role": "user", "content": "hi" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "bonjour" }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 4, "output_tokens": 2 }
        })))
        .mount(&server)
        .await;

    let adapter =
        AnthropicAdapter::with_config("ak-test", server.uri(), Duration::from_secs(5)).unwrap();
    let resp = adapter.chat(&request("claude-3-haiku")).await.unwrap();

    assert_eq!(resp.content, "bonjour");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    assert_eq!((resp.input_tokens, resp.output_tokens), (4, 2));
}

#[tokio::test]
async fn anthropic_overload_is_retryable_and_keeps_error_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(529)
                .insert_header("request-id", "req_abc")
                .set_body_json(json!({
                    "type": "error",
                    "error": { "type": "overloaded_error", "message": "Overloaded" }
                })),
        )
        .mount(&server)
        .await;

    let adapter =
        AnthropicAdapter::with_config("ak-test", server.uri(), Duration::from_secs(5)).unwrap();
    let err = adapter.chat(&request("claude-3-haiku")).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.request_id(), Some("req_abc"));
    assert_eq!(
        err.context().and_then(|c| c.provider_code.as_deref()),
        Some("overloaded_error")
    );
}

#[test]
fn anthropic_rejects_empty_key() {
    let err = AnthropicAdapter::with_config("  ", "http://localhost", Duration::from_secs(5))
        .unwrap_err();
    assert!(matches!(err, ProviderError::Config(_)));
}

#[tokio::test]
async fn oversize_prompt_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let huge = ChatRequest::new("gpt-4o-mini", vec![Message::user("x".repeat(500_001))]);

    let openai = OpenAiAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap();
    let err = openai.chat(&huge).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));
    assert!(!err.is_transient());

    let anthropic =
        AnthropicAdapter::with_config("ak-test", server.uri(), Duration::from_secs(5)).unwrap();
    let err = anthropic.chat(&huge).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidRequest { .. }));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn oversize_response_body_is_refused() {
    let server = MockServer::start().await;
    let body = "a".repeat(1024 * 1024 + 1);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let openai = OpenAiAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap();
    match openai.chat(&request("gpt-4o-mini")).await.unwrap_err() {
        ProviderError::Provider {
            message, retryable, ..
        } => {
            assert!(message.contains("Response too large"), "{message}");
            assert!(!retryable);
        }
        other => panic!("expected Provider error, got {other:?}"),
    }

    let anthropic =
        AnthropicAdapter::with_config("ak-test", server.uri(), Duration::from_secs(5)).unwrap();
    let err = anthropic.chat(&request("claude-3-haiku")).await.unwrap_err();
    assert!(err.to_string().contains("Response too large"), "{err}");
}

#[derive(Clone)]
struct FlipResponder {
    calls: Arc<AtomicUsize>,
    first: ResponseTemplate,
    second: ResponseTemplate,
}

impl Respond for FlipResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            self.first.clone()
        } else {
            self.second.clone()
        }
    }
}

#[tokio::test]
async fn gateway_retries_through_real_adapter() {
    let server = MockServer::start().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let first = ResponseTemplate::new(500).set_body_json(json!({
        "error": { "message": "transient error", "code": "internal" }
    }));
    let second = ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": "ok" }, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 1, "completion_tokens": 1 }
    }));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FlipResponder {
            calls,
            first,
            second,
        })
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5)).unwrap();
    let gateway = ModelGateway::with_provider(
        ProviderKind::OpenAi,
        "gpt-4o-mini",
        Arc::new(adapter),
        Arc::new(NoopUsageSink),
        GatewayConfig {
            retry_base_delay: Duration::from_millis(0),
            ..GatewayConfig::default()
        },
    );

    let out = gateway
        .generate("hi", GenerateOptions::default().max_retries(1))
        .await;
    assert_eq!(out, "ok");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}
