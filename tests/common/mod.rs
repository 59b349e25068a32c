//! Shared fixtures for integration tests: a scripted language model, stub
//! agents and audit sinks. None of them touch the network.

#![allow(dead_code)]

use async_trait::async_trait;
use rxmesh::agents::{Agent, AgentRequest, AgentResponse, Payload};
use rxmesh::core::llm::{
    Completion, CompletionRequest, LanguageModel, LlmError, TokenUsage, ToolCall,
};
use rxmesh::storage::{ActionRecord, AuditSink, MemoryAuditSink};
use rxmesh::{Settings, System};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replies are consumed in order; every request is kept.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<Completion, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
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

pub fn usage() -> TokenUsage {
    TokenUsage {
        input_tokens: 10,
        output_tokens: 5,
        total_tokens: 15,
    }
}

pub fn text(content: &str) -> Result<Completion, LlmError> {
    Ok(Completion {
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
        usage: usage(),
    })
}

pub fn tool_calls(calls: Vec<ToolCall>) -> Result<Completion, LlmError> {
    Ok(Completion {
        content: None,
        tool_calls: calls,
        usage: usage(),
    })
}

pub fn provider_down() -> Result<Completion, LlmError> {
    Err(LlmError::Status {
        status: 503,
        body: "unavailable".to_string(),
    })
}

/// Records each request it sees and answers with a fixed response.
pub struct StubAgent {
    id: String,
    response: AgentResponse,
    seen: Mutex<Vec<AgentRequest>>,
}

impl StubAgent {
    pub fn ok(id: &str, data: Value) -> Arc<Self> {
        let data: Payload = data.as_object().cloned().unwrap_or_default();
        Arc::new(Self {
            id: id.to_string(),
            response: AgentResponse::success(data),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(id: &str, response: AgentResponse) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            response,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for StubAgent {
    fn agent_type(&self) -> &str {
        &self.id
    }

    async fn process(&self, request: &AgentRequest) -> AgentResponse {
        self.seen.lock().unwrap().push(request.clone());
        self.response.clone()
    }
}

pub struct PanickingAgent;

#[async_trait]
impl Agent for PanickingAgent {
    fn agent_type(&self) -> &str {
        "panicking"
    }

    async fn process(&self, _request: &AgentRequest) -> AgentResponse {
        panic!("agent exploded")
    }
}

/// Rejects every record.
pub struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn log_action(&self, _record: &ActionRecord) -> anyhow::Result<()> {
        anyhow::bail!("audit store offline")
    }
}

/// A bootstrapped system with sample collaborators and an in-memory audit log.
pub fn system_with(model: Arc<ScriptedModel>) -> (System, MemoryAuditSink) {
    let audit = MemoryAuditSink::new();
    let system = System::bootstrap(Settings::default(), model, Arc::new(audit.clone()));
    (system, audit)
}

pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap_or_default()
}
