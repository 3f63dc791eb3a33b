//! Request gateway for the remote assistant service.
//!
//! Four operations, each a single logical round trip (possibly several HTTP
//! attempts, see [`retry`]):
//!
//! | Operation | Endpoint | Response field |
//! |-----------|----------|----------------|
//! | [`Assistant::analyze`] | `POST /analyze` | `analysis` |
//! | [`Assistant::check`] | `POST /check` | `feedback` |
//! | [`Assistant::suggest`] | `POST /ai/suggest/` | `suggestion` |
//! | [`Assistant::chat`] | `POST /ai/chat/` | `answer` / `error` |
//!
//! The gateway knows nothing about documents or generations. Callers tag each
//! call themselves and discard results that arrive for superseded content.
//!
//! Every failure comes back as a [`GatewayError`]: transport problems and
//! timeouts are `Network`, non-2xx statuses are `Server`, and 2xx bodies of
//! the wrong shape are `Decode`.

mod error;
pub mod retry;
mod wire;

use std::future::Future;
use std::time::Duration;

use onpoint_types::{ChatMessage, Language};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub use error::{GatewayError, GatewayErrorKind};
pub use retry::RetryConfig;

use retry::RetryOutcome;
use wire::{ChatBody, ChatRequest, CodeRequest};

pub const ANALYZE_ENDPOINT: &str = "/analyze";
pub const CHECK_ENDPOINT: &str = "/check";
pub const SUGGEST_ENDPOINT: &str = "/ai/suggest/";
pub const CHAT_ENDPOINT: &str = "/ai/chat/";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
const POOL_MAX_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

// ============================================================================
// Results
// ============================================================================

/// Free-form text from `/analyze`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResult(String);

/// Free-form text from `/check`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult(String);

/// Completion text from `/ai/suggest/`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestResult(String);

impl AnalysisResult {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.0
    }
}

impl CheckResult {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.0
    }
}

impl SuggestResult {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.0
    }
}

/// Outcome of a chat turn that reached the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatResult {
    Answer(String),
    /// The service declined and said why (shown verbatim).
    Refused(String),
}

// ============================================================================
// The seam
// ============================================================================

/// Remote assistant operations.
///
/// [`AssistantClient`] talks HTTP; tests substitute scripted fakes.
pub trait Assistant: Send + Sync + 'static {
    fn analyze(
        &self,
        code: &str,
        language: Language,
    ) -> impl Future<Output = Result<AnalysisResult, GatewayError>> + Send;

    fn check(
        &self,
        code: &str,
        language: Language,
    ) -> impl Future<Output = Result<CheckResult, GatewayError>> + Send;

    fn suggest(
        &self,
        code: &str,
        language: Language,
    ) -> impl Future<Output = Result<SuggestResult, GatewayError>> + Send;

    fn chat(
        &self,
        history: &[ChatMessage],
        current_directory: &str,
    ) -> impl Future<Output = Result<ChatResult, GatewayError>> + Send;
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Upper bound on a whole call, retries included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayConfigError {
    #[error("invalid assistant URL `{url}`: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("assistant URL `{0}` must use http or https")]
    UnsupportedScheme(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct AssistantClient {
    http: reqwest::Client,
    base_url: String,
    config: GatewayConfig,
}

impl AssistantClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayConfigError> {
        let parsed =
            Url::parse(config.base_url.trim()).map_err(|source| GatewayConfigError::InvalidBaseUrl {
                url: config.base_url.clone(),
                source,
            })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayConfigError::UnsupportedScheme(config.base_url.clone()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .tcp_keepalive(Some(TCP_KEEPALIVE))
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .build()?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    /// POST `body` to `endpoint` and decode the reply as JSON.
    async fn post_json<B>(&self, endpoint: &'static str, body: &B) -> Result<Value, GatewayError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = self.endpoint_url(endpoint);
        let call = async {
            let outcome =
                retry::send_with_retry(|| self.http.post(&url).json(body), &self.config.retry)
                    .await;

            let response = match outcome {
                RetryOutcome::Success(response) => response,
                RetryOutcome::Status(response) => {
                    let status = response.status().as_u16();
                    let body = read_capped_body(response).await;
                    return Err(GatewayError::Server {
                        endpoint,
                        status,
                        body,
                    });
                }
                RetryOutcome::Transport { attempts, source } => {
                    tracing::debug!(endpoint, attempts, error = %source, "Assistant unreachable");
                    return Err(GatewayError::transport(endpoint, &source));
                }
            };

            let bytes = response
                .bytes()
                .await
                .map_err(|e| GatewayError::transport(endpoint, &e))?;
            serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| GatewayError::decode(endpoint, format!("invalid JSON: {e}")))
        };

        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(endpoint)),
        }
    }

    async fn post_code(
        &self,
        endpoint: &'static str,
        field: &str,
        code: &str,
        language: Language,
    ) -> Result<String, GatewayError> {
        let request = CodeRequest {
            code,
            language: language.as_str(),
        };
        let body = self.post_json(endpoint, &request).await?;
        wire::text_field(endpoint, &body, field)
    }
}

impl Assistant for AssistantClient {
    async fn analyze(&self, code: &str, language: Language) -> Result<AnalysisResult, GatewayError> {
        self.post_code(ANALYZE_ENDPOINT, "analysis", code, language)
            .await
            .map(AnalysisResult)
    }

    async fn check(&self, code: &str, language: Language) -> Result<CheckResult, GatewayError> {
        self.post_code(CHECK_ENDPOINT, "feedback", code, language)
            .await
            .map(CheckResult)
    }

    async fn suggest(&self, code: &str, language: Language) -> Result<SuggestResult, GatewayError> {
        self.post_code(SUGGEST_ENDPOINT, "suggestion", code, language)
            .await
            .map(SuggestResult)
    }

    async fn chat(
        &self,
        history: &[ChatMessage],
        current_directory: &str,
    ) -> Result<ChatResult, GatewayError> {
        let request = ChatRequest {
            history,
            current_directory,
        };
        let body = self.post_json(CHAT_ENDPOINT, &request).await?;
        Ok(match wire::chat_body(CHAT_ENDPOINT, &body)? {
            ChatBody::Answer(text) => ChatResult::Answer(text),
            ChatBody::Error(text) => ChatResult::Refused(text),
        })
    }
}

/// Read an error body, keeping at most [`MAX_ERROR_BODY_BYTES`].
async fn read_capped_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> AssistantClient {
        AssistantClient::new(GatewayConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig::none(),
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_bad_base_urls() {
        let bad = GatewayConfig {
            base_url: "not a url".into(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            AssistantClient::new(bad),
            Err(GatewayConfigError::InvalidBaseUrl { .. })
        ));

        let ftp = GatewayConfig {
            base_url: "ftp://example.com".into(),
            ..GatewayConfig::default()
        };
        assert!(matches!(
            AssistantClient::new(ftp),
            Err(GatewayConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn endpoint_urls_keep_path_prefix() {
        let client = AssistantClient::new(GatewayConfig {
            base_url: "http://host:8000/api/".into(),
            ..GatewayConfig::default()
        })
        .unwrap();
        assert_eq!(client.endpoint_url(CHAT_ENDPOINT), "http://host:8000/api/ai/chat/");
    }

    #[tokio::test]
    async fn analyze_sends_code_and_language() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_json(serde_json::json!({"code": "x = 1", "language": "python"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"analysis": "Line 1: fine"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = client_for(&server)
            .analyze("x = 1", Language::Python)
            .await
            .unwrap();
        assert_eq!(result.text(), "Line 1: fine");
    }

    #[tokio::test]
    async fn server_error_keeps_status_and_truncated_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/check"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(10_000)))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .check("", Language::PlainText)
            .await
            .unwrap_err();
        match err {
            GatewayError::Server { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.len() < 5_000);
                assert!(body.ends_with("...(truncated)"));
            }
            other => panic!("expected Server, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/suggest/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .suggest("fn", Language::Rust)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), GatewayErrorKind::Decode);
    }

    #[tokio::test]
    async fn chat_error_is_refused_not_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/chat/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "no key"})),
            )
            .mount(&server)
            .await;

        let result = client_for(&server)
            .chat(&[ChatMessage::user("hi")], "")
            .await
            .unwrap();
        assert_eq!(result, ChatResult::Refused("no key".into()));
    }

    #[tokio::test]
    async fn slow_server_times_out_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"analysis": ""}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = AssistantClient::new(GatewayConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_millis(200),
            retry: RetryConfig::none(),
            ..GatewayConfig::default()
        })
        .unwrap();

        let err = client.analyze("x", Language::Python).await.unwrap_err();
        assert_eq!(err.kind(), GatewayErrorKind::Network);
        assert!(err.is_timeout());
    }
}
