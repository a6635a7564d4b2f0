//! The hosted-assistant API seam.

use async_trait::async_trait;

use super::error::Result;
use super::run::{Run, ToolOutput};
use crate::domain::{AssistantId, RunId, ThreadId};

/// Thread, message and run operations of a hosted assistant service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssistantApi: Send + Sync {
    /// Opens a new, empty conversation thread.
    async fn create_thread(&self) -> Result<ThreadId>;

    /// Appends a user message to `thread`.
    async fn add_user_message(&self, thread: &ThreadId, content: &str) -> Result<()>;

    /// Starts `assistant` on `thread`.
    async fn create_run(&self, thread: &ThreadId, assistant: &AssistantId) -> Result<Run>;

    /// Fetches the current state of a run.
    async fn retrieve_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run>;

    /// Answers the tool calls a run is waiting on.
    async fn submit_tool_outputs(
        &self,
        thread: &ThreadId,
        run: &RunId,
        outputs: &[ToolOutput],
    ) -> Result<Run>;

    /// Text of the newest assistant message in `thread`.
    async fn latest_reply(&self, thread: &ThreadId) -> Result<String>;
}
