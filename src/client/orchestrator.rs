//! Public entry point: request building plus the completion client, with every
//! failure contained at this boundary.

use super::completion::CompletionClient;
use crate::config::RelayConfig;
use crate::protocol::RequestBuilder;
use crate::types::{error_sentinel, CompletionRequest, CompletionResult, NO_DATA};
use crate::{Result, TokenStream};
use futures::{stream, FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, warn};

/// What the HTTP layer needs from the core. Both calls are total.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    async fn chat(&self, request: CompletionRequest) -> CompletionResult;

    fn chat_stream(&self, request: CompletionRequest) -> TokenStream;
}

pub struct CompletionOrchestrator {
    builder: RequestBuilder,
    client: CompletionClient,
}

impl CompletionOrchestrator {
    pub fn new(builder: RequestBuilder, client: CompletionClient) -> Self {
        Self { builder, client }
    }

    pub fn from_config(cfg: &RelayConfig) -> Result<Self> {
        Ok(Self::new(
            RequestBuilder::from_config(cfg),
            CompletionClient::from_config(cfg)?,
        ))
    }

    /// Never fails and never panics outward.
    pub async fn complete_sync(&self, request: &CompletionRequest) -> CompletionResult {
        let attempt = async {
            let payload = self.builder.build(request, false)?;
            Ok::<_, crate::Error>(self.client.send_sync(&payload).await)
        };

        match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(error = %e, "chat completion rejected");
                boundary_failure(e)
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(panic = %message, "chat completion panicked");
                boundary_failure(message)
            }
        }
    }

    /// Token stream for the request, passed through as the client produced it.
    /// An upstream that completes without content yields an empty sequence.
    pub fn complete_stream(&self, request: &CompletionRequest) -> TokenStream {
        match self.builder.build(request, true) {
            Ok(payload) => or_no_data(Some(self.client.send_stream(payload))),
            Err(e) => {
                warn!(error = %e, "streaming chat completion rejected");
                stream::iter(vec![error_sentinel(&e)]).boxed()
            }
        }
    }
}

/// `[[NO DATA]]` when no sequence was produced at all.
fn or_no_data(tokens: Option<TokenStream>) -> TokenStream {
    match tokens {
        Some(tokens) => tokens,
        None => {
            warn!("upstream produced no token stream");
            stream::iter(vec![NO_DATA.to_string()]).boxed()
        }
    }
}

#[async_trait::async_trait]
impl ChatService for CompletionOrchestrator {
    async fn chat(&self, request: CompletionRequest) -> CompletionResult {
        self.complete_sync(&request).await
    }

    fn chat_stream(&self, request: CompletionRequest) -> TokenStream {
        self.complete_stream(&request)
    }
}

/// Sentinel result for failures caught at the boundary; the id is time-derived.
fn boundary_failure(message: impl std::fmt::Display) -> CompletionResult {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    CompletionResult::new(format!("ERROR-{}", millis), error_sentinel(message))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
