//! Agent contract and the shared core every specialized agent embeds
//!
//! Information Hiding:
//! - Provider failures never escape as errors, only as failed replies
//! - Tool lookup and argument parsing hidden behind `execute_tool`
//! - The tool-use loop is the only place conversation history grows

use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload};
use crate::config::LLMConfig;
use crate::core::llm::{
    ChatMessage, CompletionRequest, LanguageModel, ResponseFormat, TokenUsage, ToolCall,
};
use crate::tools::{Tool, ToolRegistry};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// A routable unit of work. `process` reports every failure inside the
/// response envelope and never returns an error.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_type(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Names of the tools this agent exposes to its model.
    fn tool_names(&self) -> Vec<String> {
        Vec::new()
    }

    async fn process(&self, request: &AgentRequest) -> AgentResponse;
}

/// Run an agent, turning a panic into an `ORCHESTRATION_ERROR` response.
pub async fn process_guarded(agent: &dyn Agent, request: &AgentRequest) -> AgentResponse {
    match AssertUnwindSafe(agent.process(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!("[{}] Agent panicked: {}", agent.agent_type(), message);
            AgentResponse::failure(
                ErrorCode::OrchestrationError,
                format!("Agent {} panicked: {}", agent.agent_type(), message),
            )
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Outcome of one model call as seen by an agent.
#[derive(Debug, Clone, Default)]
pub struct LlmReply {
    pub success: bool,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    pub error: Option<String>,
}

impl LlmReply {
    pub fn ok(content: Option<String>, tool_calls: Vec<ToolCall>, usage: TokenUsage) -> Self {
        Self {
            success: true,
            content,
            tool_calls,
            usage,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// The reply text parsed as a JSON object, tolerating surrounding prose.
    pub fn json_object(&self) -> Option<Payload> {
        self.content.as_deref().and_then(extract_json_object)
    }

    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "unknown model error".to_string())
    }
}

/// Parse `raw` as a JSON object, falling back to the outermost `{ ... }` span.
pub fn extract_json_object(raw: &str) -> Option<Payload> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(map);
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Identity, prompt, model parameters and tools of one agent.
pub struct AgentCore {
    agent_type: String,
    description: String,
    system_prompt: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_tool_rounds: usize,
    tools: ToolRegistry,
    llm: Arc<dyn LanguageModel>,
}

impl AgentCore {
    pub fn new(
        agent_type: impl Into<String>,
        system_prompt: impl Into<String>,
        llm: Arc<dyn LanguageModel>,
        config: &LLMConfig,
    ) -> Self {
        Self {
            agent_type: agent_type.into(),
            description: String::new(),
            system_prompt: system_prompt.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_tool_rounds: 3,
            tools: ToolRegistry::new(),
            llm,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Base prompt as one system message, with optional extra context appended.
    pub fn system_message(&self, additional_context: Option<&str>) -> ChatMessage {
        let mut content = self.system_prompt.clone();
        if let Some(context) = additional_context.filter(|c| !c.is_empty()) {
            content.push_str("\n\nAdditional Context:\n");
            content.push_str(context);
        }
        ChatMessage::system(content)
    }

    /// One model call with this agent's tools plus `extra_tools`.
    pub async fn call_llm(
        &self,
        messages: Vec<ChatMessage>,
        extra_tools: &[Arc<dyn Tool>],
        response_format: Option<ResponseFormat>,
        temperature: Option<f32>,
    ) -> LlmReply {
        let mut tools = self.tools.openai_functions();
        tools.extend(
            extra_tools
                .iter()
                .map(|tool| tool.metadata().to_openai_function()),
        );

        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: temperature.unwrap_or(self.temperature),
            max_tokens: self.max_tokens,
            tools,
            response_format,
        };

        match self.llm.complete(request).await {
            Ok(completion) => {
                tracing::debug!(
                    "[{}] Model call used {} tokens",
                    self.agent_type,
                    completion.usage.total_tokens
                );
                LlmReply::ok(completion.content, completion.tool_calls, completion.usage)
            }
            Err(e) => {
                tracing::error!("[{}] LLM call failed: {}", self.agent_type, e);
                LlmReply::failed(e.to_string())
            }
        }
    }

    /// Execute one model-requested tool call. The result is always a JSON
    /// string: `{"result": ...}` or `{"error": "..."}`.
    pub async fn execute_tool(&self, call: &ToolCall) -> String {
        let name = &call.function.name;

        let Some(tool) = self.tools.get(name) else {
            tracing::warn!("[{}] Model requested unknown tool '{}'", self.agent_type, name);
            return json!({ "error": format!("Tool {} not found", name) }).to_string();
        };

        let raw = call.function.arguments.trim();
        let args = if raw.is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(
                        "[{}] Malformed arguments for tool '{}': {}",
                        self.agent_type,
                        name,
                        e
                    );
                    return json!({ "error": format!("Invalid arguments for {}: {}", name, e) })
                        .to_string();
                }
            }
        };

        tracing::info!("[{}] Executing tool: {}", self.agent_type, name);
        match tool.execute(args).await {
            Ok(result) => json!({ "result": result }).to_string(),
            Err(e) => {
                tracing::warn!("[{}] Tool '{}' failed: {}", self.agent_type, name, e);
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }

    /// Call the model, executing requested tools and feeding their results
    /// back until it answers without tool calls or the round limit is hit.
    /// Usage is summed over every call.
    pub async fn run_tool_loop(
        &self,
        mut messages: Vec<ChatMessage>,
        response_format: Option<ResponseFormat>,
    ) -> LlmReply {
        let mut usage = TokenUsage::default();
        let mut round = 0;

        loop {
            let mut reply = self
                .call_llm(messages.clone(), &[], response_format.clone(), None)
                .await;
            usage += reply.usage;
            reply.usage = usage;

            if !reply.success || reply.tool_calls.is_empty() {
                return reply;
            }
            if round >= self.max_tool_rounds {
                tracing::warn!(
                    "[{}] Tool round limit ({}) reached",
                    self.agent_type,
                    self.max_tool_rounds
                );
                return reply;
            }
            round += 1;

            messages.push(ChatMessage::assistant_tool_calls(
                reply.content.clone(),
                reply.tool_calls.clone(),
            ));
            for call in &reply.tool_calls {
                let output = self.execute_tool(call).await;
                messages.push(ChatMessage::tool(call.id.clone(), output));
            }
        }
    }
}
