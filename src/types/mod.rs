//! Core data types: conversation messages, the inbound request, the aggregated
//! result, tokens and sentinel strings.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Chat message with role and text content |
//! | [`MessageRole`] | system, user or assistant |
//! | [`CompletionRequest`] | Caller input (history or prompt) |
//! | [`CompletionResult`] | Aggregated sync answer |
//! | [`Token`] | One streamed text fragment |

pub mod completion;
pub mod message;

pub use completion::{
    error_sentinel, is_sentinel, CompletionRequest, CompletionResult, Token, NO_DATA,
    NO_RESPONSE, STREAMING_DISABLED, STREAM_TIMEOUT,
};
pub use message::{Message, MessageRole};
