//! OpenAI Assistants v2 REST client.

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::client::AssistantApi;
use super::error::{AssistantError, Result};
use super::run::{Run, RunStatus, ToolCall, ToolOutput};
use crate::domain::{AssistantId, RunId, ThreadId, ToolCallId};
use crate::providers::ai::{build_headers, retry_after, OpenAiError, OPENAI_BASE_URL};

/// Beta header value required by the Assistants API.
const ASSISTANTS_BETA: &str = "assistants=v2";

#[derive(Debug, Deserialize)]
struct WireThread {
    id: String,
}

#[derive(Debug, Serialize)]
struct WireNewMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireNewRun<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
struct WireToolOutputs<'a> {
    tool_outputs: &'a [ToolOutput],
}

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    status: RunStatus,
    required_action: Option<WireRequiredAction>,
    last_error: Option<WireLastError>,
}

#[derive(Debug, Deserialize)]
struct WireRequiredAction {
    submit_tool_outputs: WireSubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct WireSubmitToolOutputs {
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireLastError {
    code: Option<String>,
    message: String,
}

impl From<WireRun> for Run {
    fn from(wire: WireRun) -> Self {
        let calls = wire
            .required_action
            .map(|action| {
                action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|call| ToolCall {
                        id: ToolCallId(call.id),
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Run {
            id: RunId(wire.id),
            status: wire.status,
            required_action: calls,
            last_error: wire.last_error.map(|e| match e.code {
                Some(code) => format!("{code}: {}", e.message),
                None => e.message,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMessageList {
    data: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    content: Vec<WireContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text { text: WireText },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireText {
    value: String,
}

/// Newest assistant message text, parts joined by blank lines.
fn newest_assistant_text(list: WireMessageList) -> Option<String> {
    let message = list.data.into_iter().find(|m| m.role == "assistant")?;
    let parts: Vec<String> = message
        .content
        .into_iter()
        .filter_map(|part| match part {
            WireContent::Text { text } => Some(text.value),
            WireContent::Other => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// [`AssistantApi`] over the OpenAI REST endpoints.
pub struct OpenAiAssistantClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAssistantClient {
    /// Creates a client for api.openai.com.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Points the client at another compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let mut headers = build_headers(Some(&self.api_key)).map_err(|_| {
            AssistantError::Authentication("API key is not a valid header value".to_string())
        })?;
        headers.insert("openai-beta", HeaderValue::from_static(ASSISTANTS_BETA));

        let response = request.headers(headers).send().await?;
        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AssistantError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    async fn handle_error_response(response: reqwest::Response) -> AssistantError {
        let status = response.status().as_u16();

        if status == 429 {
            return AssistantError::RateLimited {
                retry_after_secs: retry_after(&response),
            };
        }

        if let Ok(error) = response.json::<OpenAiError>().await {
            if status == 401 || error.error.code.as_deref() == Some("invalid_api_key") {
                return AssistantError::Authentication(error.error.message);
            }
            return AssistantError::Api {
                status,
                message: error.error.message,
            };
        }

        AssistantError::Api {
            status,
            message: format!("HTTP {status}"),
        }
    }
}

#[async_trait]
impl AssistantApi for OpenAiAssistantClient {
    async fn create_thread(&self) -> Result<ThreadId> {
        let request = self
            .client
            .post(self.url("threads"))
            .json(&serde_json::json!({}));
        let thread: WireThread = self.send(request).await?;
        tracing::info!(thread_id = %thread.id, "created thread");
        Ok(ThreadId(thread.id))
    }

    async fn add_user_message(&self, thread: &ThreadId, content: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread}/messages")))
            .json(&WireNewMessage {
                role: "user",
                content,
            });
        let _: serde_json::Value = self.send(request).await?;
        tracing::debug!(thread_id = %thread, chars = content.len(), "posted user message");
        Ok(())
    }

    async fn create_run(&self, thread: &ThreadId, assistant: &AssistantId) -> Result<Run> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread}/runs")))
            .json(&WireNewRun {
                assistant_id: &assistant.0,
            });
        let run: WireRun = self.send(request).await?;
        tracing::info!(thread_id = %thread, run_id = %run.id, status = %run.status, "created run");
        Ok(run.into())
    }

    async fn retrieve_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run> {
        let request = self
            .client
            .get(self.url(&format!("threads/{thread}/runs/{run}")));
        let run: WireRun = self.send(request).await?;
        Ok(run.into())
    }

    async fn submit_tool_outputs(
        &self,
        thread: &ThreadId,
        run: &RunId,
        outputs: &[ToolOutput],
    ) -> Result<Run> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread}/runs/{run}/submit_tool_outputs")))
            .json(&WireToolOutputs {
                tool_outputs: outputs,
            });
        let run: WireRun = self.send(request).await?;
        tracing::debug!(run_id = %run.id, outputs = outputs.len(), "submitted tool outputs");
        Ok(run.into())
    }

    async fn latest_reply(&self, thread: &ThreadId) -> Result<String> {
        let request = self
            .client
            .get(self.url(&format!("threads/{thread}/messages")))
            .query(&[("order", "desc"), ("limit", "20")]);
        let list: WireMessageList = self.send(request).await?;
        newest_assistant_text(list).ok_or(AssistantError::NoReply)
    }
}
