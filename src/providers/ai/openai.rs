//! OpenAI-compatible chat-completions provider.
//!
//! Works with OpenAI and any endpoint exposing `/chat/completions` with
//! `response_format` support.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::traits::{
    CompletionRequest, CompletionResponse, FinishReason, LlmError, LlmProvider, LlmResult,
    Message, ResponseFormat, Role, TokenUsage,
};

/// Default base URL for OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API request format.
#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: msg.content.clone(),
        }
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiError {
    pub(crate) error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorDetail {
    pub(crate) message: String,
    pub(crate) code: Option<String>,
}

/// Bearer-authenticated JSON headers.
///
/// Fails when the key cannot travel in a header (control characters, stray
/// newlines from a pasted `.env` value).
pub(crate) fn build_headers(api_key: Option<&str>) -> Result<HeaderMap, InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(api_key) = api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(headers)
}

/// Seconds from a `retry-after` header, if present and numeric.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Provider for OpenAI-compatible APIs.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleProvider {
    /// Creates a new provider for OpenAI's API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: Some(api_key.into()),
            model: model.into(),
        }
    }

    /// Creates a new provider for a custom endpoint.
    pub fn custom(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }

    /// Overrides the HTTP client (useful for custom timeouts or proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> OpenAiRequest<'a> {
        let mut messages: Vec<OpenAiMessage> = Vec::new();

        if let Some(ref system) = request.system_prompt {
            messages.push(OpenAiMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(OpenAiMessage::from));

        OpenAiRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            response_format: request.response_format.as_ref(),
        }
    }

    fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        }
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> LlmError {
        let status = response.status().as_u16();

        if status == 429 {
            return LlmError::RateLimited {
                retry_after_secs: retry_after(&response),
            };
        }

        if let Ok(error) = response.json::<OpenAiError>().await {
            if status == 401 || error.error.code.as_deref() == Some("invalid_api_key") {
                return LlmError::AuthenticationError(error.error.message);
            }
            return LlmError::ApiError {
                status,
                message: error.error.message,
            };
        }

        LlmError::ApiError {
            status,
            message: format!("HTTP {}", status),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request(request);
        let headers = build_headers(self.api_key.as_deref()).map_err(|_| {
            LlmError::AuthenticationError("API key is not a valid header value".to_string())
        })?;

        tracing::debug!(model = %self.model, messages = body.messages.len(), "chat completion");
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(LlmError::InvalidResponse(format!("Model refused: {refusal}")));
        }
        let finish_reason = Self::parse_finish_reason(choice.finish_reason.as_deref());
        if finish_reason == FinishReason::Length {
            if let Some(max_tokens) = request.max_tokens {
                return Err(LlmError::Truncated { max_tokens });
            }
        }

        let tokens_used = api_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
            tokens_used,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_request_serialization() {
        let request = CompletionRequest::new(vec![Message::user("Hello")])
            .with_system_prompt("Be helpful")
            .with_temperature(1.0)
            .with_max_tokens(2048);

        let provider = OpenAiCompatibleProvider::openai("test-key", "gpt-4o-mini");
        let json = serde_json::to_value(provider.build_request(&request)).unwrap();

        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert_eq!(json["max_completion_tokens"], 2048);
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_request_carries_response_format() {
        let request = CompletionRequest::new(vec![Message::user("genera una mail")])
            .with_response_format(ResponseFormat::json_schema(
                "email_schema",
                serde_json::json!({"type": "object"}),
            ));

        let provider = OpenAiCompatibleProvider::openai("key", "gpt-4o-mini");
        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        assert_eq!(json["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_openai_response_parsing() {
        let json = r#"{
            "choices": [{
                "message": {"content": "{\"body\": \"hi\"}", "refusal": null},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15
            }
        }"#;

        let response: OpenAiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices.len(), 1);
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("{\"body\": \"hi\"}")
        );
        assert_eq!(response.usage.as_ref().unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_finish_reason() {
        assert_eq!(
            OpenAiCompatibleProvider::parse_finish_reason(Some("stop")),
            FinishReason::Stop
        );
        assert_eq!(
            OpenAiCompatibleProvider::parse_finish_reason(Some("length")),
            FinishReason::Length
        );
        assert_eq!(
            OpenAiCompatibleProvider::parse_finish_reason(None),
            FinishReason::Other
        );
    }

    #[test]
    fn test_build_headers() {
        let headers = build_headers(Some("sk-test")).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer sk-test");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert!(build_headers(None).unwrap().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_build_headers_rejects_unprintable_key() {
        assert!(build_headers(Some("sk-test\n")).is_err());
    }

    #[tokio::test]
    async fn test_bad_key_fails_before_sending() {
        let provider = OpenAiCompatibleProvider::custom(
            "http://127.0.0.1:9",
            Some("sk-\u{7f}".to_string()),
            "gpt-4o-mini",
        );
        let request = CompletionRequest::new(vec![Message::user("ciao")]);

        let err = provider.complete(&request).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationError(_)));
    }

    #[test]
    fn test_trailing_slash_removal() {
        let provider =
            OpenAiCompatibleProvider::custom("http://localhost:11434/v1/", None, "llama3");
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert_eq!(provider.model(), "llama3");
    }
}
