//! Domain layer types.
//!
//! This module contains the email records that make up the corpus and the
//! identifiers used by the hosted assistant.

mod email;
mod types;

pub use email::EmailRecord;
pub use types::{AssistantId, RunId, ThreadId, ToolCallId};
