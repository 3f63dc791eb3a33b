//! Chat panel against a mock assistant service.

use onpoint_engine::{ChatSession, NO_ANSWER, TRANSPORT_FAILURE};
use onpoint_types::ChatRole;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{client_for, mount_chat, start_assistant_mock};

#[tokio::test]
async fn sends_history_and_directory() {
    let server = start_assistant_mock().await;
    Mock::given(method("POST"))
        .and(path("/ai/chat/"))
        .and(body_partial_json(serde_json::json!({
            "current_directory": "src\n[F] main.py",
            "history": [
                {"role": "assistant", "content": onpoint_engine::GREETING},
                {"role": "user", "content": "what does main do?"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"answer": "It prints a greeting."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let mut chat = ChatSession::new();
    let reply = chat
        .send(&client, "what does main do?", "src\n[F] main.py")
        .await;

    assert_eq!(reply.as_deref(), Some("It prints a greeting."));
    assert_eq!(chat.history().len(), 3);
    assert_eq!(chat.history()[2].role, ChatRole::Assistant);
}

#[tokio::test]
async fn service_error_is_shown_verbatim() {
    let server = start_assistant_mock().await;
    mount_chat(&server, serde_json::json!({"error": "API key missing"})).await;
    let client = client_for(&server.uri());
    let mut chat = ChatSession::new();

    let reply = chat.send(&client, "hello", "").await;
    assert_eq!(reply.as_deref(), Some("Error: API key missing"));
}

#[tokio::test]
async fn response_alias_and_empty_answer() {
    let server = start_assistant_mock().await;
    mount_chat(&server, serde_json::json!({"response": "aliased"})).await;
    let client = client_for(&server.uri());
    let mut chat = ChatSession::new();

    assert_eq!(chat.send(&client, "first", "").await.as_deref(), Some("aliased"));

    server.reset().await;
    mount_chat(&server, serde_json::json!({"answer": ""})).await;
    assert_eq!(chat.send(&client, "second", "").await.as_deref(), Some(NO_ANSWER));
}

#[tokio::test]
async fn unreachable_service_yields_generic_failure() {
    // Nothing listens on the discard port.
    let client = client_for("http://127.0.0.1:9");
    let mut chat = ChatSession::new();
    assert_eq!(
        chat.send(&client, "anyone there?", "").await.as_deref(),
        Some(TRANSPORT_FAILURE)
    );
}

#[tokio::test]
async fn server_failure_yields_generic_failure() {
    let server = start_assistant_mock().await;
    crate::common::mount_status(&server, "/ai/chat/", 503).await;
    let client = client_for(&server.uri());
    let mut chat = ChatSession::new();

    assert_eq!(chat.send(&client, "hi", "").await.as_deref(), Some(TRANSPORT_FAILURE));
    assert_eq!(chat.history().len(), 3);
}

#[tokio::test]
async fn error_wins_over_answer_in_same_body() {
    let server = start_assistant_mock().await;
    mount_chat(
        &server,
        serde_json::json!({"answer": "partial", "error": "rate limited"}),
    )
    .await;
    let client = client_for(&server.uri());
    let mut chat = ChatSession::new();

    assert_eq!(
        chat.send(&client, "hello", "").await.as_deref(),
        Some("Error: rate limited")
    );
}
