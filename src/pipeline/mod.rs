//! Streaming response pipeline.
//!
//! ```text
//! HTTP bytes → UTF-8 carry → line framing → JSON frame → choices[].delta.content → Token
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | SSE line decoder with partial-line buffering |

pub mod decode;

pub use decode::SseDecoder;
