//! Chat-completions client for the TaskDesk assistant.
//!
//! Speaks the OpenAI-compatible `/chat/completions` wire format against a
//! configurable base URL. One request per call, no retries.

mod client;
mod error;
mod openai;
mod types;

pub use client::{ClientSettings, DEFAULT_TIMEOUT, LlmClient};
pub use error::{LlmError, Result};
pub use types::{ChatMessage, ChatResponse, Role, Usage};
