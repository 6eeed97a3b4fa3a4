//! Completion client and orchestrator.
//!
//! [`CompletionClient`] talks to the upstream through a [`crate::transport::Transport`];
//! [`CompletionOrchestrator`] is what callers use.

pub mod completion;
pub mod orchestrator;

pub use completion::CompletionClient;
pub use orchestrator::{ChatService, CompletionOrchestrator};
