//! Upstream request payload construction.

use crate::config::RelayConfig;
use crate::types::{CompletionRequest, Message};
use crate::{Error, ErrorContext, Result};
use serde::Serialize;

/// Always the first message sent upstream. Callers cannot override it.
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Provide concise answers.";

/// Body of `POST {base_url}/chat/completions`. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamPayload {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
    pub messages: Vec<Message>,
}

/// Turns caller requests into upstream payloads. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl RequestBuilder {
    pub fn new(model: impl Into<String>, temperature: f64, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    pub fn from_config(cfg: &RelayConfig) -> Self {
        Self::new(cfg.model.clone(), cfg.temperature, cfg.max_tokens)
    }

    /// `[system, ...history]` when the request carries messages, otherwise
    /// `[system, user(prompt)]`. Fails only when neither is usable.
    pub fn build(&self, request: &CompletionRequest, streaming: bool) -> Result<UpstreamPayload> {
        let mut messages = vec![Message::system(SYSTEM_PROMPT)];

        match (&request.messages, &request.prompt) {
            (Some(history), _) if !history.is_empty() => {
                messages.extend(history.iter().cloned());
            }
            (_, Some(prompt)) => messages.push(Message::user(prompt.clone())),
            (_, None) => {
                return Err(Error::validation_with_context(
                    "request carries neither messages nor a prompt",
                    ErrorContext::new()
                        .with_field_path("request.prompt")
                        .with_source("request_builder"),
                ))
            }
        }

        Ok(UpstreamPayload {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: streaming,
            messages,
        })
    }
}
