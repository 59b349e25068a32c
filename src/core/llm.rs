use crate::config::LLMConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::AddAssign;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// Assistant turn that requested tool invocations.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Output of one tool invocation, answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool invocation requested by the model. Arguments stay a raw string:
/// they come from a probabilistic source and are parsed at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Value,
    #[serde(default = "default_strict")]
    pub strict: bool,
}

fn default_strict() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Everything one model call needs. `tools` holds OpenAI `function` specs.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response decode error: {0}")]
    Decode(String),
    #[error("completion timed out after {0}ms")]
    Timeout(u64),
    #[error("provider returned no choices")]
    EmptyChoices,
    #[error("all {attempts} attempts failed, last error: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

impl LlmError {
    /// Transport trouble, timeouts, throttling and server faults are worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Timeout(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// The contract the orchestration core needs from a language model provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// OpenAI-compatible chat completions client with per-attempt timeout and
/// exponential backoff between retries.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
    max_retries: u32,
    base_delay_ms: u64,
}

impl OpenAiClient {
    pub fn new(api_key: String, config: &LLMConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
        }
    }

    async fn attempt(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let wire = response
            .json::<WireResponse>()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let usage = wire.usage.map(TokenUsage::from).unwrap_or_default();
        let message = wire
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyChoices)?
            .message;

        Ok(Completion {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
            usage,
        })
    }
}

/// Exponential backoff before retry `attempt` (1-based), saturating at `u64::MAX`.
fn backoff_delay_ms(base_delay_ms: u64, attempt: u32) -> u64 {
    base_delay_ms.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)))
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let attempts = self.max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay_ms(self.base_delay_ms, attempt);
                tracing::warn!(
                    "[OpenAiClient] Retrying completion (attempt {}/{}) after {}ms delay",
                    attempt + 1,
                    attempts,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
            }

            let outcome = match timeout(self.timeout, self.attempt(&request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LlmError::Timeout(self.timeout.as_millis() as u64)),
            };

            match outcome {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() => {
                    tracing::warn!("[OpenAiClient] Completion attempt failed: {}", e);
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::error!("[OpenAiClient] Completion rejected: {}", e);
                    return Err(e);
                }
            }
        }

        let last = last_error.unwrap_or(LlmError::EmptyChoices);
        Err(LlmError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted model for unit tests: replies are consumed in order and every
    //! request is kept for inspection.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
        pub(crate) requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(replies: Vec<Result<Completion, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn text(content: &str) -> Result<Completion, LlmError> {
            Ok(Completion {
                content: Some(content.to_string()),
                tool_calls: Vec::new(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                },
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::Http("script exhausted".to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_backoff_delay_doubles_and_saturates() {
        assert_eq!(backoff_delay_ms(100, 1), 100);
        assert_eq!(backoff_delay_ms(100, 2), 200);
        assert_eq!(backoff_delay_ms(100, 4), 800);
        assert_eq!(backoff_delay_ms(100, 80), u64::MAX);
        assert_eq!(backoff_delay_ms(u64::MAX, 3), u64::MAX);
    }

    fn config_for(server: &MockServer, max_retries: u32) -> LLMConfig {
        LLMConfig {
            api_base: server.uri(),
            timeout_ms: 2_000,
            max_retries,
            retry_base_delay_ms: 1,
            ..LLMConfig::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-test".to_string(),
            messages: vec![ChatMessage::user("hello")],
            temperature: 0.3,
            max_tokens: 100,
            tools: Vec::new(),
            response_format: Some(ResponseFormat::JsonObject),
        }
    }

    #[tokio::test]
    async fn test_complete_parses_content_tool_calls_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "search_faq", "arguments": "{\"query\":\"shipping\"}"}
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test".to_string(), &config_for(&server, 0));
        let completion = client.complete(request()).await.unwrap();

        assert!(completion.content.is_none());
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].function.name, "search_faq");
        assert_eq!(completion.usage.input_tokens, 12);
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn test_complete_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test".to_string(), &config_for(&server, 2));
        let completion = client.complete(request()).await.unwrap();

        assert_eq!(completion.content.as_deref(), Some("ok"));
        assert_eq!(completion.usage, TokenUsage::default());
    }

    #[tokio::test]
    async fn test_complete_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new("sk-test".to_string(), &config_for(&server, 3));
        let err = client.complete(request()).await.unwrap_err();

        assert!(matches!(err, LlmError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_complete_reports_exhausted_budget_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(500))
                    .set_body_json(json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let mut config = config_for(&server, 1);
        config.timeout_ms = 50;
        let client = OpenAiClient::new("sk-test".to_string(), &config);
        let err = client.complete(request()).await.unwrap_err();

        match err {
            LlmError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, LlmError::Timeout(50)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_request_serializes_tools_and_format_only_when_present() {
        let mut req = request();
        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["response_format"]["type"], "json_object");

        req.response_format = None;
        req.tools = vec![json!({"type": "function"})];
        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_tool_message_shape() {
        let message = ChatMessage::tool("call_9", "{\"result\":1}");
        let body = serde_json::to_value(&message).unwrap();
        assert_eq!(body["role"], "tool");
        assert_eq!(body["tool_call_id"], "call_9");
        assert!(body.get("tool_calls").is_none());
    }
}
