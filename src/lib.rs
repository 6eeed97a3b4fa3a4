//! # chat-relay
//!
//! Backend relay between chat clients and an OpenAI-compatible completions API.
//!
//! ## Overview
//!
//! A caller's conversation (or bare prompt) is turned into an upstream payload,
//! sent either as a one-shot call whose answer is aggregated, or as a streaming
//! call whose SSE body is decoded into an ordered sequence of text tokens.
//!
//! Upstream failures never surface as errors to the caller. They become
//! bracket-delimited sentinel text (`[[ERROR: ...]]`, `[[STREAM TIMEOUT]]`, ...)
//! inside an otherwise successful response.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_relay::{CompletionOrchestrator, CompletionRequest, RelayConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> chat_relay::Result<()> {
//!     let cfg = RelayConfig::load(None)?;
//!     let relay = CompletionOrchestrator::from_config(&cfg)?;
//!
//!     let answer = relay.complete_sync(&CompletionRequest::from_prompt("Hello!")).await;
//!     println!("{}: {}", answer.id, answer.text);
//!
//!     let mut tokens = relay.complete_stream(&CompletionRequest::from_prompt("Tell me a story"));
//!     while let Some(token) = tokens.next().await {
//!         print!("{}", token);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Messages, request/result shapes, sentinels |
//! | [`protocol`] | Upstream payload building and response aggregation |
//! | [`pipeline`] | SSE decoding into tokens |
//! | [`transport`] | Upstream HTTP transport seam |
//! | [`client`] | Completion client and orchestrator |
//! | [`resilience`] | Per-client rate limiting |
//! | [`server`] | axum HTTP surface |
//! | [`config`] | Process-wide configuration |

pub mod client;
pub mod config;
pub mod pipeline;
pub mod protocol;
pub mod resilience;
pub mod server;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ChatService, CompletionClient, CompletionOrchestrator};
pub use config::RelayConfig;
pub use pipeline::SseDecoder;
pub use protocol::{RequestBuilder, UpstreamPayload};
pub use types::{CompletionRequest, CompletionResult, Message, MessageRole, Token};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of fallible items.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Token sequence handed to callers. Infallible: failures are sentinel tokens.
pub type TokenStream = futures::stream::BoxStream<'static, Token>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
