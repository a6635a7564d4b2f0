//! Hosted assistant conversations.
//!
//! The assistant lives on a remote service; this module drives it. A user
//! turn posts a message to a thread, starts a run, and then follows the run
//! through its lifecycle, answering tool calls with local email search.
//!
//! # Architecture
//!
//! - [`AssistantApi`] - Thread/message/run operations (the network seam)
//! - [`OpenAiAssistantClient`] - Assistants v2 REST implementation
//! - [`RunStatus`] / [`next_step`] - The run state machine, free of I/O
//! - [`Clock`] / [`Backoff`] - Injected waiting between polls
//! - [`ToolDispatcher`] - Routes tool calls, e.g. to [`EmailSearchTool`]
//! - [`ChatSession`] - Ties the above together per conversation

mod client;
mod clock;
mod error;
mod openai;
mod run;
mod session;
mod tools;

pub use client::AssistantApi;
pub use clock::{Backoff, Clock, ExponentialBackoff, FixedBackoff, TokioClock};
pub use error::{AssistantError, Result};
pub use openai::OpenAiAssistantClient;
pub use run::{next_step, Run, RunOutcome, RunStatus, RunStep, ToolCall, ToolOutput};
pub use session::{ChatMessage, ChatSession, DEFAULT_MAX_POLLS};
pub use tools::{EmailHit, EmailSearchTool, Tool, ToolDispatcher, ToolRegistry};
