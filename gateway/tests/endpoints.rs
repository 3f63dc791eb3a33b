//! End-to-end checks of every assistant endpoint against a mock server.

use std::time::Duration;

use onpoint_gateway::{
    Assistant, AssistantClient, ChatResult, GatewayConfig, GatewayError, GatewayErrorKind,
    RetryConfig,
};
use onpoint_types::{ChatMessage, Language};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retries() -> RetryConfig {
    RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter_factor: 0.0,
    }
}

fn client(server: &MockServer, retry: RetryConfig) -> AssistantClient {
    AssistantClient::new(GatewayConfig {
        base_url: server.uri(),
        request_timeout: Duration::from_secs(5),
        retry,
        ..GatewayConfig::default()
    })
    .expect("client")
}

async fn mount_ok(server: &MockServer, endpoint: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn each_endpoint_decodes_its_field() {
    let server = MockServer::start().await;
    mount_ok(&server, "/analyze", json!({"analysis": "Line 2: unused"})).await;
    mount_ok(&server, "/check", json!({"feedback": "Line 1 [Syntax]: colon"})).await;
    mount_ok(&server, "/ai/suggest/", json!({"suggestion": "return x"})).await;
    mount_ok(&server, "/ai/chat/", json!({"answer": "Sure."})).await;

    let client = client(&server, RetryConfig::none());

    let analysis = client.analyze("x", Language::Python).await.unwrap();
    assert_eq!(analysis.text(), "Line 2: unused");

    let check = client.check("x", Language::Python).await.unwrap();
    assert_eq!(check.text(), "Line 1 [Syntax]: colon");

    let suggestion = client.suggest("def f(x):", Language::Python).await.unwrap();
    assert_eq!(suggestion.text(), "return x");

    let chat = client
        .chat(&[ChatMessage::user("help")], "src")
        .await
        .unwrap();
    assert_eq!(chat, ChatResult::Answer("Sure.".into()));
}

#[tokio::test]
async fn null_field_is_empty_result() {
    let server = MockServer::start().await;
    mount_ok(&server, "/check", json!({"feedback": null})).await;

    let result = client(&server, RetryConfig::none())
        .check("ok", Language::Go)
        .await
        .unwrap();
    assert_eq!(result.text(), "");
}

#[tokio::test]
async fn missing_field_is_decode_error() {
    let server = MockServer::start().await;
    mount_ok(&server, "/analyze", json!({})).await;

    let err = client(&server, RetryConfig::none())
        .analyze("x", Language::Python)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), GatewayErrorKind::Decode);
}

#[tokio::test]
async fn persistent_5xx_surfaces_status_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, fast_retries())
        .analyze("x", Language::Python)
        .await
        .unwrap_err();
    match err {
        GatewayError::Server { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected Server, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_failure_recovers_within_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ai/suggest/"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_ok(&server, "/ai/suggest/", json!({"suggestion": "pass"})).await;

    let result = client(&server, fast_retries())
        .suggest("def f():", Language::Python)
        .await
        .unwrap();
    assert_eq!(result.text(), "pass");
}

#[tokio::test]
async fn chat_sends_history_and_directory() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ai/chat/"))
        .and(body_partial_json(json!({
            "history": [
                {"role": "assistant", "content": "Hi! How can I help you today?"},
                {"role": "user", "content": "what is here?"}
            ],
            "current_directory": "backend"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "main.py"})))
        .expect(1)
        .mount(&server)
        .await;

    let history = [
        ChatMessage::assistant("Hi! How can I help you today?"),
        ChatMessage::user("what is here?"),
    ];
    let result = client(&server, RetryConfig::none())
        .chat(&history, "backend")
        .await
        .unwrap();
    assert_eq!(result, ChatResult::Answer("main.py".into()));
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let client = AssistantClient::new(GatewayConfig {
        base_url: "http://127.0.0.1:9".into(),
        request_timeout: Duration::from_secs(5),
        retry: RetryConfig::none(),
        ..GatewayConfig::default()
    })
    .unwrap();

    let err = client.analyze("x", Language::Python).await.unwrap_err();
    assert_eq!(err.kind(), GatewayErrorKind::Network);
    assert!(!err.is_timeout());
}
