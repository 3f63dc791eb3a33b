//! Shared test utilities and fixtures
//!
//! A wiremock server standing in for the assistant service, plus helpers to
//! build clients and engines against it.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use onpoint_engine::{
    BufferSurface, EngineOptions, EventOutcome, FeedbackEngine, RecordOutcome, Workspace,
};
use onpoint_gateway::{AssistantClient, GatewayConfig, RetryConfig};
use onpoint_types::Pipeline;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub type Engine = FeedbackEngine<AssistantClient, BufferSurface>;

/// Short enough to keep the suite fast, long enough to coalesce a burst.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

/// Upper bound on waiting for any single engine event.
pub const EVENT_WAIT: Duration = Duration::from_secs(5);

/// Start a mock server that simulates the assistant service
pub async fn start_assistant_mock() -> MockServer {
    MockServer::start().await
}

/// Mount a 200 reply carrying `{field: text}` on `endpoint`.
pub async fn mount_text(server: &MockServer, endpoint: &str, field: &str, text: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ field: text })))
        .mount(server)
        .await;
}

pub async fn mount_analysis(server: &MockServer, text: &str) {
    mount_text(server, "/analyze", "analysis", text).await;
}

pub async fn mount_check(server: &MockServer, text: &str) {
    mount_text(server, "/check", "feedback", text).await;
}

pub async fn mount_suggestion(server: &MockServer, text: &str) {
    mount_text(server, "/ai/suggest/", "suggestion", text).await;
}

pub async fn mount_chat(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/ai/chat/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount a bare status reply on `endpoint`.
pub async fn mount_status(server: &MockServer, endpoint: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(status).set_body_string("upstream failure"))
        .mount(server)
        .await;
}

pub fn client_for(base_url: &str) -> AssistantClient {
    AssistantClient::new(GatewayConfig {
        base_url: base_url.to_string(),
        request_timeout: Duration::from_secs(5),
        retry: RetryConfig::none(),
        ..GatewayConfig::default()
    })
    .expect("mock server URL is valid")
}

pub fn engine_for(server: &MockServer, options: EngineOptions) -> Engine {
    FeedbackEngine::new(
        Arc::new(client_for(&server.uri())),
        BufferSurface::default(),
        options,
    )
}

/// Debounced analysis only; suggestions are requested explicitly.
pub fn fast_options() -> EngineOptions {
    EngineOptions {
        debounce: TEST_DEBOUNCE,
        auto_suggest: false,
        request_timeout: Duration::from_secs(5),
        ..EngineOptions::default()
    }
}

pub fn manual_options() -> EngineOptions {
    EngineOptions {
        auto_analyze: false,
        ..fast_options()
    }
}

/// Handle events until `pipeline` records a response.
pub async fn wait_for_record(engine: &mut Engine, pipeline: Pipeline) -> RecordOutcome {
    loop {
        let event = tokio::time::timeout(EVENT_WAIT, engine.next_event())
            .await
            .expect("engine event within deadline")
            .expect("engine channel open");
        if let EventOutcome::Recorded {
            pipeline: recorded,
            outcome,
            ..
        } = engine.handle_event(event)
            && recorded == pipeline
        {
            return outcome;
        }
    }
}

pub fn temp_workspace() -> (tempfile::TempDir, Workspace) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let workspace = Workspace::open(dir.path()).expect("open temp workspace");
    (dir, workspace)
}
