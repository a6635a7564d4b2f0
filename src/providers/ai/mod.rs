//! Chat-completion providers.
//!
//! Used by the corpus generator to ask a model for structured emails.
//!
//! # Example
//!
//! ```rust,no_run
//! use mailsense::providers::ai::{
//!     CompletionRequest, LlmProvider, Message, OpenAiCompatibleProvider,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let openai = OpenAiCompatibleProvider::openai("sk-...", "gpt-4o-mini");
//!
//! let request = CompletionRequest::new(vec![Message::user("Hello!")])
//!     .with_system_prompt("You are a helpful assistant.");
//!
//! let response = openai.complete(&request).await?;
//! println!("Response: {}", response.text);
//! # Ok(())
//! # }
//! ```

mod openai;
mod traits;

pub(crate) use openai::{build_headers, retry_after, OpenAiError};
pub use openai::{OpenAiCompatibleProvider, OPENAI_BASE_URL};
pub use traits::{
    CompletionRequest, CompletionResponse, FinishReason, JsonSchema, LlmError, LlmProvider,
    LlmResult, Message, ResponseFormat, Role, TokenUsage,
};
