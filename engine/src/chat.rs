//! Conversational assistant panel.

use onpoint_gateway::{Assistant, ChatResult};
use onpoint_types::ChatMessage;

pub const GREETING: &str = "Hi! How can I help you today?";
pub const NO_ANSWER: &str = "No answer received from AI.";
pub const TRANSPORT_FAILURE: &str = "Network or server error.";

/// Ordered chat history, seeded with the assistant's greeting.
#[derive(Debug, Clone)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: vec![ChatMessage::assistant(GREETING)],
        }
    }

    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Send one user turn and record the reply.
    ///
    /// Blank input is ignored and returns `None`. Failures never escape: they
    /// become the reply text.
    pub async fn send<A: Assistant>(
        &mut self,
        assistant: &A,
        input: &str,
        current_directory: &str,
    ) -> Option<String> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        self.history.push(ChatMessage::user(input));

        let reply = match assistant.chat(&self.history, current_directory).await {
            Ok(ChatResult::Answer(text)) if text.trim().is_empty() => NO_ANSWER.to_string(),
            Ok(ChatResult::Answer(text)) => text,
            Ok(ChatResult::Refused(error)) => format!("Error: {error}"),
            Err(err) => {
                tracing::warn!(endpoint = err.endpoint(), "Chat request failed: {err}");
                TRANSPORT_FAILURE.to_string()
            }
        };

        self.history.push(ChatMessage::assistant(reply.clone()));
        Some(reply)
    }
}
