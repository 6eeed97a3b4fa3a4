//! Caller-facing request/response shapes and the sentinel vocabulary.
//!
//! Failures never leave the core as errors. They are rendered as bracket-delimited
//! sentinel text so that the HTTP layer can always answer 200.

use super::message::Message;
use serde::{Deserialize, Serialize};

/// One incremental text fragment of a streaming completion.
pub type Token = String;

pub const NO_RESPONSE: &str = "[[No response from OpenAI]]";
pub const STREAM_TIMEOUT: &str = "[[STREAM TIMEOUT]]";
pub const NO_DATA: &str = "[[NO DATA]]";
pub const STREAMING_DISABLED: &str = "Streaming disabled on server";

/// `[[ERROR: <message>]]`
pub fn error_sentinel(message: impl std::fmt::Display) -> String {
    format!("[[ERROR: {}]]", message)
}

/// True for any `[[...]]` signal, so consumers can tell them apart from content.
pub fn is_sentinel(text: &str) -> bool {
    text.len() >= 4 && text.starts_with("[[") && text.ends_with("]]")
}

/// Inbound chat request.
///
/// `messages` wins when non-empty; otherwise `prompt` becomes a single user turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Aggregated answer of a synchronous completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub id: String,
    pub text: String,
}

impl CompletionResult {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Sentinel result carrying a freshly generated id.
    pub fn sentinel(text: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), text)
    }

    pub fn is_sentinel(&self) -> bool {
        is_sentinel(&self.text)
    }
}
