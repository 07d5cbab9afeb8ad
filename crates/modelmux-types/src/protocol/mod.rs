//! Protocol definitions for upstream providers.
//!
//! Only the OpenAI ChatCompletions shape is spoken on both sides of the
//! gateway; request bodies are otherwise forwarded as raw JSON.

pub mod openai;

pub use openai::{ChatMessage, ChatUsage, ContentPart, MessageContent, ModelEntry, ModelList};
