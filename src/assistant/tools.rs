//! Local functions the assistant can call.
//!
//! The hosted assistant is configured with a `search_emails` function. When a
//! run stops in `requires_action`, each requested call is routed here and the
//! result travels back as a plain string.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::{AssistantError, Result};
use super::run::{ToolCall, ToolOutput};
use crate::corpus::Corpus;
use crate::embedding::SimilarityIndex;

/// A named function backed by local code.
///
/// `call` may block (model inference, disk); the registry runs it on the
/// blocking thread pool.
pub trait Tool: Send + Sync {
    /// Function name as registered on the assistant.
    fn name(&self) -> &str;

    /// Runs the function on its raw JSON arguments.
    fn call(&self, arguments: &str) -> Result<String>;
}

/// Answers tool calls.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Produces an output for `call`. Never fails: errors become the output.
    async fn dispatch(&self, call: &ToolCall) -> ToolOutput;
}

/// Dispatches by function name over a set of [`Tool`]s.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `tool`, replacing any tool with the same name.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    async fn dispatch(&self, call: &ToolCall) -> ToolOutput {
        let result = match self.tools.iter().find(|t| t.name() == call.name) {
            Some(tool) => {
                let tool = Arc::clone(tool);
                let arguments = call.arguments.clone();
                tokio::task::spawn_blocking(move || tool.call(&arguments))
                    .await
                    .map_err(|e| AssistantError::TaskFailed(e.to_string()))
                    .and_then(|result| result)
            }
            None => Err(AssistantError::ToolArguments {
                tool: call.name.clone(),
                reason: "unknown tool".to_string(),
            }),
        };

        let output = result.unwrap_or_else(|e| {
            tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
            serde_json::json!({ "error": e.to_string() }).to_string()
        });

        ToolOutput {
            tool_call_id: call.id.clone(),
            output,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArguments {
    query: String,
}

/// One search hit as returned to the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailHit {
    pub row: usize,
    pub score: f32,
    pub date: String,
    pub subject: String,
    pub from: String,
    pub body: String,
}

/// `search_emails`: semantic search over the indexed corpus.
pub struct EmailSearchTool {
    index: Arc<SimilarityIndex>,
    corpus: Arc<Corpus>,
    top_k: usize,
}

impl EmailSearchTool {
    pub const NAME: &'static str = "search_emails";

    /// Pairs an index with the corpus it was built from.
    ///
    /// Rows are joined to emails by position, so both must hold the same
    /// number of entries.
    pub fn new(index: Arc<SimilarityIndex>, corpus: Arc<Corpus>, top_k: usize) -> Result<Self> {
        if index.len() != corpus.len() {
            return Err(AssistantError::IndexOutOfSync {
                rows: index.len(),
                documents: corpus.len(),
            });
        }
        Ok(Self {
            index,
            corpus,
            top_k,
        })
    }

    /// The best `top_k` emails for `query`, best first.
    pub fn search(&self, query: &str) -> Result<Vec<EmailHit>> {
        let results = self.index.top_k(query, self.top_k)?;
        results
            .into_iter()
            .map(|result| {
                let doc = self
                    .corpus
                    .get(result.index)
                    .ok_or(AssistantError::IndexOutOfSync {
                        rows: self.index.len(),
                        documents: self.corpus.len(),
                    })?;
                Ok(EmailHit {
                    row: result.index,
                    score: result.score,
                    date: doc.email.date.clone(),
                    subject: doc.email.subject.clone(),
                    from: doc.email.from.clone(),
                    body: doc.email.body.clone(),
                })
            })
            .collect()
    }
}

impl Tool for EmailSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn call(&self, arguments: &str) -> Result<String> {
        let args: SearchArguments =
            serde_json::from_str(arguments).map_err(|e| AssistantError::ToolArguments {
                tool: Self::NAME.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(query = %args.query, top_k = self.top_k, "searching emails");
        let hits = self.search(&args.query)?;
        serde_json::to_string(&hits).map_err(|e| AssistantError::InvalidResponse(e.to_string()))
    }
}
