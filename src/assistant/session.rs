//! A conversation with the hosted assistant.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::client::AssistantApi;
use super::clock::{Backoff, Clock, FixedBackoff, TokioClock};
use super::error::{AssistantError, Result};
use super::run::{next_step, Run, RunOutcome, RunStatus, RunStep, ToolOutput};
use super::tools::ToolDispatcher;
use crate::domain::{AssistantId, ThreadId};
use crate::providers::ai::Role;

/// Default cap on status polls for one run.
pub const DEFAULT_MAX_POLLS: u32 = 120;

/// One entry of the local transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Drives user turns through thread, run and tool-call round trips.
pub struct ChatSession {
    api: Arc<dyn AssistantApi>,
    assistant: AssistantId,
    tools: Arc<dyn ToolDispatcher>,
    clock: Arc<dyn Clock>,
    backoff: Box<dyn Backoff>,
    max_polls: u32,
    thread: Option<ThreadId>,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        assistant: AssistantId,
        tools: Arc<dyn ToolDispatcher>,
    ) -> Self {
        Self {
            api,
            assistant,
            tools,
            clock: Arc::new(TokioClock),
            backoff: Box::new(FixedBackoff::default()),
            max_polls: DEFAULT_MAX_POLLS,
            thread: None,
            history: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Continues an existing thread instead of opening a new one.
    pub fn with_thread(mut self, thread: ThreadId) -> Self {
        self.thread = Some(thread);
        self
    }

    pub fn thread(&self) -> Option<&ThreadId> {
        self.thread.as_ref()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Sends `text` and waits for the assistant's reply.
    ///
    /// The thread is created on first use. The user message is recorded even
    /// when the run fails; the reply is recorded only on success.
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let thread = self.ensure_thread().await?;
        self.record(Role::User, text);

        self.api.add_user_message(&thread, text).await?;
        let run = self.api.create_run(&thread, &self.assistant).await?;
        self.drive(&thread, run).await?;

        let reply = self.api.latest_reply(&thread).await?;
        self.record(Role::Assistant, &reply);
        Ok(reply)
    }

    async fn ensure_thread(&mut self) -> Result<ThreadId> {
        if let Some(thread) = &self.thread {
            return Ok(thread.clone());
        }
        let thread = self.api.create_thread().await?;
        self.thread = Some(thread.clone());
        Ok(thread)
    }

    fn record(&mut self, role: Role, content: &str) {
        self.history.push(ChatMessage {
            role,
            content: content.to_string(),
            at: Utc::now(),
        });
    }

    /// Polls `run` until it reaches a terminal state.
    async fn drive(&self, thread: &ThreadId, mut run: Run) -> Result<()> {
        let mut polls = 0u32;

        loop {
            match next_step(&run) {
                RunStep::Finish(RunOutcome::Completed) => {
                    tracing::info!(run_id = %run.id, polls, "run completed");
                    return Ok(());
                }
                RunStep::Finish(RunOutcome::Failed(message)) => {
                    tracing::error!(run_id = %run.id, %message, "run failed");
                    return Err(AssistantError::RunFailed {
                        run_id: run.id,
                        message,
                    });
                }
                RunStep::Finish(RunOutcome::Cancelled) => {
                    tracing::warn!(run_id = %run.id, "run cancelled");
                    return Err(AssistantError::RunCancelled(run.id));
                }
                RunStep::SubmitToolOutputs(calls) => {
                    let mut outputs: Vec<ToolOutput> = Vec::with_capacity(calls.len());
                    for call in &calls {
                        outputs.push(self.tools.dispatch(call).await);
                    }
                    let next = self
                        .api
                        .submit_tool_outputs(thread, &run.id, &outputs)
                        .await?;
                    run = observe(run, next)?;
                    if run.status == RunStatus::RequiresAction {
                        // The snapshot predates the outputs just accepted.
                        run.status = RunStatus::Running;
                        run.required_action.clear();
                    }
                }
                RunStep::Wait => {
                    run = self.poll(thread, run, &mut polls).await?;
                }
            }
        }
    }

    async fn poll(&self, thread: &ThreadId, run: Run, polls: &mut u32) -> Result<Run> {
        if *polls >= self.max_polls {
            return Err(AssistantError::PollLimitExceeded {
                run_id: run.id,
                polls: *polls,
            });
        }
        self.clock.sleep(self.backoff.delay(*polls)).await;
        *polls += 1;

        let next = self.api.retrieve_run(thread, &run.id).await?;
        observe(run, next)
    }
}

/// Accepts `next` if the state machine allows it after `prev`.
fn observe(prev: Run, next: Run) -> Result<Run> {
    if !prev.status.can_transition_to(next.status) {
        return Err(AssistantError::IllegalTransition {
            run_id: prev.id,
            from: prev.status,
            to: next.status,
        });
    }
    if prev.status != next.status {
        tracing::debug!(run_id = %next.id, from = %prev.status, to = %next.status, "run status changed");
    }
    Ok(next)
}
