use super::{Transport, TransportError};
use crate::config::RelayConfig;
use crate::protocol::UpstreamPayload;
use crate::{BoxStream, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

/// Pooled reqwest client bound to one upstream endpoint and credential.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpTransport {
    /// No client-level timeout: the completion client applies its own hard bounds,
    /// and a streaming body must be allowed to outlive any per-request default.
    pub fn new(cfg: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(cfg.pool_max_idle_per_host)
            .pool_idle_timeout(Some(cfg.pool_idle_timeout))
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self::with_client(client, cfg))
    }

    pub fn with_client(client: reqwest::Client, cfg: &RelayConfig) -> Self {
        Self {
            client,
            url: cfg.completions_url(),
            api_key: cfg.api_key.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, payload: &UpstreamPayload, accept: &str) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept)
            .json(payload)
            .send()
            .await
            .map_err(TransportError::Http)?;

        let status = resp.status();
        if !status.is_success() {
            // Best effort: the body is only used for the error message.
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &UpstreamPayload) -> Result<String> {
        let resp = self.post(payload, "application/json").await?;
        let body = resp.text().await.map_err(TransportError::Http)?;
        Ok(body)
    }

    async fn open_stream(&self, payload: &UpstreamPayload) -> Result<BoxStream<'static, Bytes>> {
        let resp = self.post(payload, "text/event-stream").await?;
        let byte_stream = resp
            .bytes_stream()
            .map_err(|e| crate::Error::Transport(TransportError::Http(e)));
        Ok(Box::pin(byte_stream))
    }
}
