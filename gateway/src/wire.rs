//! JSON bodies exchanged with the assistant service.

use onpoint_types::ChatMessage;
use serde::Serialize;
use serde_json::Value;

use crate::GatewayError;

#[derive(Debug, Serialize)]
pub(crate) struct CodeRequest<'a> {
    pub code: &'a str,
    pub language: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub history: &'a [ChatMessage],
    pub current_directory: &'a str,
}

/// Pull a text field out of a decoded body.
///
/// A missing field is malformed; `null` means the assistant had nothing to
/// report and decodes as empty text.
pub(crate) fn text_field(
    endpoint: &'static str,
    body: &Value,
    field: &str,
) -> Result<String, GatewayError> {
    let Value::Object(map) = body else {
        return Err(GatewayError::decode(endpoint, "expected a JSON object"));
    };
    match map.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Null) => Ok(String::new()),
        Some(other) => Err(GatewayError::decode(
            endpoint,
            format!("field `{field}` is {}, expected a string", type_name(other)),
        )),
        None => Err(GatewayError::decode(
            endpoint,
            format!("missing field `{field}`"),
        )),
    }
}

/// Chat replies come as `{answer}`, `{response}` (older servers) or `{error}`.
pub(crate) enum ChatBody {
    Answer(String),
    Error(String),
}

/// A non-empty `error` wins over any answer in the same body.
pub(crate) fn chat_body(endpoint: &'static str, body: &Value) -> Result<ChatBody, GatewayError> {
    if let Some(error) = body.get("error").and_then(Value::as_str)
        && !error.is_empty()
    {
        return Ok(ChatBody::Error(error.to_string()));
    }
    for field in ["answer", "response"] {
        if body.get(field).is_some() {
            return text_field(endpoint, body, field).map(ChatBody::Answer);
        }
    }
    if body.get("error").is_some() {
        return text_field(endpoint, body, "error").map(ChatBody::Error);
    }
    // Reuse the object/field diagnostics for the message.
    text_field(endpoint, body, "answer").map(ChatBody::Answer)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
