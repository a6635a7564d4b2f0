//! External service providers.
//!
//! - [`ai`] - Chat-completion LLM providers (OpenAI-compatible)

pub mod ai;
