//! Upstream wire protocol (OpenAI-compatible chat completions).
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`request`] | Builds the upstream payload from a caller request |
//! | [`response`] | Aggregates a non-streaming response body |
//!
//! Streaming frames are handled by [`crate::pipeline::decode`].

pub mod request;
pub mod response;

pub use request::{RequestBuilder, UpstreamPayload, SYSTEM_PROMPT};
pub use response::parse_completion_body;
