//! Upstream transport seam.
//!
//! [`Transport`] is the only place the core touches the network. [`HttpTransport`]
//! is the production implementation; tests inject their own.

pub mod http;

use crate::protocol::UpstreamPayload;
use crate::{BoxStream, Result};
use bytes::Bytes;

pub use http::HttpTransport;

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Non-streaming call. Returns the raw response body.
    async fn send(&self, payload: &UpstreamPayload) -> Result<String>;

    /// Streaming call. Returns the raw response body as it arrives.
    async fn open_stream(&self, payload: &UpstreamPayload) -> Result<BoxStream<'static, Bytes>>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Other(String),
}
