//! Errors raised while talking to the hosted assistant.

use thiserror::Error;

use super::run::RunStatus;
use crate::domain::RunId;
use crate::embedding::EmbeddingError;

/// Errors that can occur during an assistant exchange.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Run {run_id} failed: {message}")]
    RunFailed { run_id: RunId, message: String },

    #[error("Run {0} was cancelled")]
    RunCancelled(RunId),

    #[error("Run {run_id} still not finished after {polls} polls")]
    PollLimitExceeded { run_id: RunId, polls: u32 },

    #[error("Run {run_id} moved from {from} to {to}")]
    IllegalTransition {
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("Email search failed: {0}")]
    Search(#[from] EmbeddingError),

    #[error("Bad arguments for tool {tool}: {reason}")]
    ToolArguments { tool: String, reason: String },

    #[error("Index has {rows} rows but the corpus has {documents} emails; rebuild the index")]
    IndexOutOfSync { rows: usize, documents: usize },

    #[error("Tool task failed: {0}")]
    TaskFailed(String),

    #[error("No assistant reply in thread")]
    NoReply,
}

/// Result type for assistant operations.
pub type Result<T> = std::result::Result<T, AssistantError>;
