//! Scripted assistant for engine tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use onpoint_gateway::{
    ANALYZE_ENDPOINT, AnalysisResult, Assistant, CHAT_ENDPOINT, CHECK_ENDPOINT, ChatResult,
    CheckResult, GatewayError, SUGGEST_ENDPOINT, SuggestResult,
};
use onpoint_types::{ChatMessage, ChatRole, Language};

pub(crate) enum Reply {
    Text(String),
    Refused(String),
    Fail(GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub endpoint: &'static str,
    pub code: String,
    pub language: Language,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<(Duration, Reply)>,
    by_code: HashMap<String, (Duration, Reply)>,
    calls: Vec<Call>,
}

/// Replies registered for a specific code win; the rest are consumed in call
/// order. An exhausted script answers `""` immediately.
#[derive(Clone, Default)]
pub(crate) struct ScriptedAssistant {
    script: Arc<Mutex<Script>>,
}

impl ScriptedAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, delay: Duration, text: &str) -> &Self {
        self.push(delay, Reply::Text(text.to_string()))
    }

    pub fn push(&self, delay: Duration, reply: Reply) -> &Self {
        self.script.lock().unwrap().replies.push_back((delay, reply));
        self
    }

    /// Answer the first call carrying exactly `code` with `text`.
    pub fn reply_to(&self, code: &str, delay: Duration, text: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .by_code
            .insert(code.to_string(), (delay, Reply::Text(text.to_string())));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.endpoint == endpoint)
            .collect()
    }

    fn take(&self, endpoint: &'static str, code: &str, language: Language) -> (Duration, Reply) {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            endpoint,
            code: code.to_string(),
            language,
        });
        if let Some(reply) = script.by_code.remove(code) {
            return reply;
        }
        script
            .replies
            .pop_front()
            .unwrap_or((Duration::ZERO, Reply::Text(String::new())))
    }

    fn text_reply(
        &self,
        endpoint: &'static str,
        code: &str,
        language: Language,
    ) -> impl Future<Output = Result<String, GatewayError>> + Send + use<> {
        let (delay, reply) = self.take(endpoint, code, language);
        async move {
            tokio::time::sleep(delay).await;
            match reply {
                Reply::Text(text) | Reply::Refused(text) => Ok(text),
                Reply::Fail(err) => Err(err),
            }
        }
    }
}

impl Assistant for ScriptedAssistant {
    fn analyze(
        &self,
        code: &str,
        language: Language,
    ) -> impl Future<Output = Result<AnalysisResult, GatewayError>> + Send {
        let reply = self.text_reply(ANALYZE_ENDPOINT, code, language);
        async move { reply.await.map(AnalysisResult::new) }
    }

    fn check(
        &self,
        code: &str,
        language: Language,
    ) -> impl Future<Output = Result<CheckResult, GatewayError>> + Send {
        let reply = self.text_reply(CHECK_ENDPOINT, code, language);
        async move { reply.await.map(CheckResult::new) }
    }

    fn suggest(
        &self,
        code: &str,
        language: Language,
    ) -> impl Future<Output = Result<SuggestResult, GatewayError>> + Send {
        let reply = self.text_reply(SUGGEST_ENDPOINT, code, language);
        async move { reply.await.map(SuggestResult::new) }
    }

    fn chat(
        &self,
        history: &[ChatMessage],
        current_directory: &str,
    ) -> impl Future<Output = Result<ChatResult, GatewayError>> + Send {
        let last_user = history
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map_or("", |message| message.content.as_str());
        let code = format!("{current_directory}|{last_user}|{}", history.len());
        let (delay, reply) = self.take(CHAT_ENDPOINT, &code, Language::PlainText);
        async move {
            tokio::time::sleep(delay).await;
            match reply {
                Reply::Text(text) => Ok(ChatResult::Answer(text)),
                Reply::Refused(error) => Ok(ChatResult::Refused(error)),
                Reply::Fail(err) => Err(err),
            }
        }
    }
}
