//! Upstream calls with hard time bounds and failure containment.

use crate::config::RelayConfig;
use crate::pipeline::SseDecoder;
use crate::protocol::{parse_completion_body, UpstreamPayload};
use crate::transport::{HttpTransport, Transport};
use crate::types::{error_sentinel, CompletionResult, NO_RESPONSE, STREAM_TIMEOUT};
use crate::{BoxStream, Error, Result, TokenStream};
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Owns the upstream transport. Every failure it sees is returned as sentinel
/// content, never as an error.
#[derive(Clone)]
pub struct CompletionClient {
    transport: Arc<dyn Transport>,
    sync_timeout: Duration,
    stream_timeout: Duration,
}

impl CompletionClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        sync_timeout: Duration,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            sync_timeout,
            stream_timeout,
        }
    }

    pub fn from_config(cfg: &RelayConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(cfg)?);
        Ok(Self::new(transport, cfg.sync_timeout, cfg.stream_timeout))
    }

    /// One-shot completion bounded by the sync timeout.
    pub async fn send_sync(&self, payload: &UpstreamPayload) -> CompletionResult {
        match self.try_send_sync(payload).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "upstream sync request failed");
                CompletionResult::sentinel(error_sentinel(&e))
            }
        }
    }

    async fn try_send_sync(&self, payload: &UpstreamPayload) -> Result<CompletionResult> {
        info!(model = %payload.model, "calling upstream sync API");

        let body = tokio::time::timeout(self.sync_timeout, self.transport.send(payload))
            .await
            .map_err(|_| Error::Timeout(self.sync_timeout))??;

        debug!(body = %body, "upstream response");

        if body.trim().is_empty() {
            return Ok(CompletionResult::sentinel(NO_RESPONSE));
        }
        parse_completion_body(&body)
    }

    /// Streaming completion as an ordered token sequence.
    ///
    /// The stream timeout is one deadline for the whole stream, starting at the
    /// first poll. A transport failure ends the sequence with one
    /// `[[ERROR: ...]]` token, the deadline with `[[STREAM TIMEOUT]]`. Dropping the
    /// returned stream drops the upstream response and its connection.
    pub fn send_stream(&self, payload: UpstreamPayload) -> TokenStream {
        info!(model = %payload.model, "calling upstream stream API");

        let transport = Arc::clone(&self.transport);
        let budget = self.stream_timeout;

        let opened = async move {
            match transport.open_stream(&payload).await {
                Ok(bytes) => SseDecoder::new().decode_stream(bytes),
                Err(e) => {
                    let failed: BoxStream<'static, String> =
                        Box::pin(stream::iter(vec![Err::<String, Error>(e)]));
                    failed
                }
            }
        };
        let tokens: BoxStream<'static, String> = Box::pin(stream::once(opened).flatten());

        enum Phase {
            Idle(BoxStream<'static, String>),
            Running(BoxStream<'static, String>, Instant),
            Finished,
        }

        stream::unfold(Phase::Idle(tokens), move |phase| async move {
            let (mut inner, deadline) = match phase {
                Phase::Idle(inner) => (inner, Instant::now() + budget),
                Phase::Running(inner, deadline) => (inner, deadline),
                Phase::Finished => return None,
            };

            match tokio::time::timeout_at(deadline, inner.next()).await {
                Ok(Some(Ok(token))) => {
                    debug!(token = %token, "SSE token");
                    Some((token, Phase::Running(inner, deadline)))
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "SSE stream error");
                    Some((error_sentinel(&e), Phase::Finished))
                }
                Ok(None) => None,
                Err(_) => {
                    warn!(timeout = ?budget, "SSE stream timed out");
                    Some((STREAM_TIMEOUT.to_string(), Phase::Finished))
                }
            }
        })
        .boxed()
    }
}
