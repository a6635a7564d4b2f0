//! The run lifecycle as an explicit state machine.
//!
//! A run starts `queued`, works while `running`, may stop in
//! `requires_action` until its tool calls are answered, and ends in exactly
//! one of `completed`, `failed` or `cancelled`. [`next_step`] maps a polled
//! run onto what the driver must do next; it performs no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{RunId, ToolCallId};

/// Status of an assistant run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    #[serde(rename = "in_progress", alias = "cancelling")]
    Running,
    RequiresAction,
    Completed,
    #[serde(alias = "expired", alias = "incomplete")]
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether the run can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a poll may observe `next` after `self`.
    ///
    /// Staying in a non-terminal state is always allowed. Terminal states
    /// have no outgoing edges, not even to themselves.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match self {
            Queued | Running => true,
            RequiresAction => !matches!(next, Completed),
            Completed | Failed | Cancelled => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::RequiresAction => "requires_action",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A function call the assistant wants answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    /// Raw JSON argument string as sent by the model.
    pub arguments: String,
}

/// The answer to one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: ToolCallId,
    pub output: String,
}

/// Snapshot of a run as last seen by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
    /// Pending tool calls; only meaningful in `requires_action`.
    pub required_action: Vec<ToolCall>,
    pub last_error: Option<String>,
}

impl Run {
    /// A run with no pending action or error.
    pub fn new(id: impl Into<RunId>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            status,
            required_action: Vec::new(),
            last_error: None,
        }
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.required_action = calls;
        self
    }

    pub fn with_last_error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(message.into());
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// What the driver does after observing a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStep {
    /// Sleep, then poll again.
    Wait,
    /// Answer these calls, then poll again.
    SubmitToolOutputs(Vec<ToolCall>),
    /// Stop polling.
    Finish(RunOutcome),
}

/// Decides the next step for an observed run.
pub fn next_step(run: &Run) -> RunStep {
    match run.status {
        RunStatus::Queued | RunStatus::Running => RunStep::Wait,
        RunStatus::RequiresAction => RunStep::SubmitToolOutputs(run.required_action.clone()),
        RunStatus::Completed => RunStep::Finish(RunOutcome::Completed),
        RunStatus::Failed => RunStep::Finish(RunOutcome::Failed(
            run.last_error
                .clone()
                .unwrap_or_else(|| "run failed without an error message".to_string()),
        )),
        RunStatus::Cancelled => RunStep::Finish(RunOutcome::Cancelled),
    }
}
