//! LLM module - the decision oracle backend
//!
//! Provides the provider abstraction with Ollama as the implementation.

pub mod ollama;
pub mod traits;

pub use ollama::OllamaClient;
pub use traits::{GenerateOptions, LLMProvider, LLMResponse, StreamCallback, TokenUsage};
