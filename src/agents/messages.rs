//! Request/response envelope shared by every agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::core::llm::TokenUsage;

pub type Payload = Map<String, Value>;

/// Stable, machine-readable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LlmError,
    ValidationFailed,
    AgentNotFound,
    WorkflowAgentMissing,
    WorkflowFailed,
    OrchestrationError,
    MissingFile,
    OcrError,
    ParsingError,
    InvalidResponse,
    OutOfStock,
    InvalidAction,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LlmError => "LLM_ERROR",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::AgentNotFound => "AGENT_NOT_FOUND",
            ErrorCode::WorkflowAgentMissing => "WORKFLOW_AGENT_MISSING",
            ErrorCode::WorkflowFailed => "WORKFLOW_FAILED",
            ErrorCode::OrchestrationError => "ORCHESTRATION_ERROR",
            ErrorCode::MissingFile => "MISSING_FILE",
            ErrorCode::OcrError => "OCR_ERROR",
            ErrorCode::ParsingError => "PARSING_ERROR",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ErrorCode::OutOfStock => "OUT_OF_STOCK",
            ErrorCode::InvalidAction => "INVALID_ACTION",
        }
    }

    /// Fallback message when a failure is reported without one.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::LlmError => "Language model call failed",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::AgentNotFound => "Target agent is not registered",
            ErrorCode::WorkflowAgentMissing => "Workflow step names an unregistered agent",
            ErrorCode::WorkflowFailed => "Workflow step failed",
            ErrorCode::OrchestrationError => "Unexpected orchestration failure",
            ErrorCode::MissingFile => "Required file was not provided",
            ErrorCode::OcrError => "Text extraction failed",
            ErrorCode::ParsingError => "Document parsing failed",
            ErrorCode::InvalidResponse => "Model returned an unusable response",
            ErrorCode::OutOfStock => "Requested items are out of stock",
            ErrorCode::InvalidAction => "Unknown action",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// Inbound envelope. Agents only ever see it by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "new_message_id")]
    pub message_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub metadata: Payload,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl Default for AgentRequest {
    fn default() -> Self {
        Self::new(Payload::new())
    }
}

impl AgentRequest {
    pub fn new(payload: Payload) -> Self {
        Self {
            user_id: None,
            conversation_id: None,
            session_id: None,
            message_id: new_message_id(),
            timestamp: Utc::now(),
            payload,
            metadata: Payload::new(),
        }
    }

    /// Free-text request, routed by the model.
    pub fn from_message(message: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("message".to_string(), Value::String(message.into()));
        Self::new(payload)
    }

    /// Structured request with an explicit intent.
    pub fn from_intent(intent: impl Into<String>, mut payload: Payload) -> Self {
        payload.insert("intent".to_string(), Value::String(intent.into()));
        Self::new(payload)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Same caller identity and metadata, new id and payload.
    pub fn derive(&self, payload: Payload) -> Self {
        Self {
            user_id: self.user_id.clone(),
            conversation_id: self.conversation_id.clone(),
            session_id: self.session_id.clone(),
            message_id: new_message_id(),
            timestamp: Utc::now(),
            payload,
            metadata: self.metadata.clone(),
        }
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Outbound envelope. Failures always carry an error message and code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: Payload,
    pub error: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub metadata: Payload,
    pub confidence: f64,
    pub escalation_needed: bool,
}

impl AgentResponse {
    fn base(success: bool) -> Self {
        Self {
            success,
            message_id: new_message_id(),
            timestamp: Utc::now(),
            data: Payload::new(),
            error: None,
            error_code: None,
            metadata: Payload::new(),
            confidence: 1.0,
            escalation_needed: false,
        }
    }

    pub fn success(data: Payload) -> Self {
        Self {
            data,
            ..Self::base(true)
        }
    }

    pub fn failure(code: ErrorCode, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = code.description().to_string();
        }
        Self {
            error: Some(error),
            error_code: Some(code),
            ..Self::base(false)
        }
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    pub fn with_data_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Clamped into `[0, 1]`; NaN counts as zero.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_escalation(mut self, escalation_needed: bool) -> Self {
        self.escalation_needed = escalation_needed;
        self
    }

    pub fn with_usage(self, usage: TokenUsage) -> Self {
        self.with_metadata(
            "usage",
            json!({
                "input_tokens": usage.input_tokens,
                "output_tokens": usage.output_tokens,
                "total_tokens": usage.total_tokens,
            }),
        )
    }

    /// Token usage an agent recorded under `metadata.usage`, if any.
    pub fn usage(&self) -> TokenUsage {
        self.metadata
            .get("usage")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    pub fn error_code_str(&self) -> Option<&'static str> {
        self.error_code.as_ref().map(ErrorCode::as_str)
    }

    /// JSON form used inside workflow result logs.
    pub fn to_json(&self) -> Value {
        json!({
            "success": self.success,
            "message_id": self.message_id,
            "timestamp": self.timestamp.to_rfc3339(),
            "data": self.data,
            "error": self.error,
            "error_code": self.error_code_str(),
            "metadata": self.metadata,
            "confidence": self.confidence,
            "escalation_needed": self.escalation_needed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_generates_message_id() {
        let a = AgentRequest::from_message("hello");
        let b = AgentRequest::from_message("hello");
        assert_ne!(a.message_id, b.message_id);
        assert!(Uuid::parse_str(&a.message_id).is_ok());
        assert_eq!(a.payload_str("message"), Some("hello"));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: AgentRequest =
            serde_json::from_value(json!({"payload": {"intent": "payment"}})).unwrap();
        assert!(!request.message_id.is_empty());
        assert!(request.user_id.is_none());
        assert_eq!(request.payload_str("intent"), Some("payment"));
    }

    #[test]
    fn test_derive_keeps_identity_and_replaces_payload() {
        let original = AgentRequest::from_message("x")
            .with_user("u1")
            .with_conversation("c1")
            .with_metadata("channel", json!("web"));
        let mut payload = Payload::new();
        payload.insert("k".to_string(), json!(1));

        let derived = original.derive(payload);
        assert_eq!(derived.user_id.as_deref(), Some("u1"));
        assert_eq!(derived.conversation_id.as_deref(), Some("c1"));
        assert_eq!(derived.metadata["channel"], "web");
        assert_eq!(derived.payload["k"], 1);
        assert!(derived.payload.get("message").is_none());
        assert_ne!(derived.message_id, original.message_id);
    }

    #[test]
    fn test_failure_always_has_message_and_code() {
        let response = AgentResponse::failure(ErrorCode::OutOfStock, "");
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Requested items are out of stock"));
        assert_eq!(response.error_code, Some(ErrorCode::OutOfStock));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let response = AgentResponse::success(Payload::new()).with_confidence(1.7);
        assert_eq!(response.confidence, 1.0);
        let response = response.with_confidence(-0.2);
        assert_eq!(response.confidence, 0.0);
        let response = response.with_confidence(f64::NAN);
        assert_eq!(response.confidence, 0.0);
    }

    #[test]
    fn test_error_codes_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ErrorCode::WorkflowAgentMissing).unwrap(),
            json!("WORKFLOW_AGENT_MISSING")
        );
        assert_eq!(ErrorCode::LlmError.to_string(), "LLM_ERROR");
        let response = AgentResponse::failure(ErrorCode::InvalidAction, "bad");
        assert_eq!(response.to_json()["error_code"], "INVALID_ACTION");
    }

    #[test]
    fn test_usage_round_trips_through_metadata() {
        let usage = TokenUsage {
            input_tokens: 7,
            output_tokens: 3,
            total_tokens: 10,
        };
        let response = AgentResponse::success(Payload::new()).with_usage(usage);
        assert_eq!(response.usage(), usage);
        assert_eq!(AgentResponse::success(Payload::new()).usage(), TokenUsage::default());
    }
}
