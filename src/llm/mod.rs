//! Chat completion client for OpenAI-compatible APIs.
//!
//! This module provides the HTTP client used by every LLM-backed stage of
//! the pipeline, together with the request/response types it speaks.

mod client;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use client::LlmClient;
pub use types::{
    ChatChoice, ChatRequest, ChatResponse, GenerationOptions, Message, MessageRole, Usage,
};
