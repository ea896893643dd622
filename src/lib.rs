//! Terminal chat client for the Gemini API.
//!
//! Responses stream in as `data: {json}` lines and are shown as they grow;
//! conversations and settings are kept on disk between runs.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod image;
pub mod llm;
pub mod slash;
pub mod storage;

pub use app::{App, GenerationGate, SendOutcome};
pub use error::ChatError;
pub use events::{Conversation, LlmEvent, Message, Role};
pub use llm::{LlmClient, LlmRequest};
