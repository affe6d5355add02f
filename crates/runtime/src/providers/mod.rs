//! LLM provider backends.

mod anthropic;
mod scripted;

pub use anthropic::{AnthropicBackend, AnthropicBackendBuilder};
pub use scripted::ScriptedBackend;
