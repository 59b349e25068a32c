//! Orchestrator - intent routing and dispatch
//!
//! Routing pattern:
//! - Explicit `intent` in the payload is looked up in a static table, no model call
//! - Otherwise the model classifies `message` into a routing decision
//! - Any analysis failure falls back to the default agent
//! - Each request is routed exactly once
//!
//! Information Hiding:
//! - Hides intent classification logic
//! - Hides agent selection and audit recording
//! - Exposes the same `Agent` interface as the agents it routes to

use crate::agents::base::{
    extract_json_object, panic_message, process_guarded, Agent, AgentCore,
};
use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload, Priority};
use crate::agents::registry::AgentRegistry;
use crate::agents::workflow::{WorkflowDefinition, WorkflowEngine, WorkflowStep};
use crate::config::Settings;
use crate::core::llm::{ChatMessage, LanguageModel, ResponseFormat};
use crate::storage::{ActionRecord, AuditSink};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

pub const ORCHESTRATOR_ID: &str = "orchestrator";
const FALLBACK_AGENT: &str = "customer_support";

const ORCHESTRATOR_PROMPT: &str = r#"You are the Orchestrator Agent for an online pharmacy platform.

Your role is to analyze each user request and route it to the specialized agent best suited to handle it.

Available Agents:
- customer_support: General inquiries, FAQs, order status
- medicine_search: Find medicines, check availability, get details
- prescription_validation: Validate uploaded prescriptions
- order_processing: Create and manage orders
- payment: Process payments
- delivery: Track shipments, delivery info
- compliance_safety: Safety checks, drug interactions, personal data handling

Routing Rules:
- Medicine searches -> medicine_search
- Prescription uploads -> prescription_validation
- Order questions -> customer_support (for status) or order_processing (for creation)
- Payment issues -> payment
- General questions -> customer_support
- Safety concerns -> compliance_safety

Always respond with JSON in this format:
{
    "target_agent": "agent_type",
    "reasoning": "why this agent was chosen",
    "context_to_pass": {"key": "value"},
    "priority": "low|normal|high|urgent"
}"#;

/// Intent → agent identifier. Some targets (`payment`, `delivery`) may have
/// no registered agent; dispatch reports that as `AGENT_NOT_FOUND`.
static INTENT_ROUTES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("search_medicine", "medicine_search"),
        ("upload_prescription", "prescription_validation"),
        ("check_order", "customer_support"),
        ("create_order", "order_processing"),
        ("payment", "payment"),
        ("track_delivery", "delivery"),
        ("general_question", "customer_support"),
        ("safety_check", "compliance_safety"),
    ])
});

/// Agent for a known intent.
pub fn route_for_intent(intent: &str) -> Option<&'static str> {
    INTENT_ROUTES.get(intent).copied()
}

/// Known intents, sorted
pub fn known_intents() -> Vec<&'static str> {
    let mut intents: Vec<_> = INTENT_ROUTES.keys().copied().collect();
    intents.sort_unstable();
    intents
}

fn default_target() -> String {
    FALLBACK_AGENT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    #[serde(default = "default_target")]
    pub target_agent: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub context_to_pass: Payload,
    #[serde(default)]
    pub priority: Priority,
}

impl RoutingDecision {
    pub fn new(target_agent: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            target_agent: target_agent.into(),
            reasoning: reasoning.into(),
            context_to_pass: Payload::new(),
            priority: Priority::Normal,
        }
    }

    pub fn fallback(target_agent: impl Into<String>, reason: &str) -> Self {
        Self::new(
            target_agent,
            format!("Fallback routing due to analysis failure: {}", reason),
        )
    }

    pub fn to_json(&self) -> Value {
        json!({
            "target_agent": self.target_agent,
            "reasoning": self.reasoning,
            "context_to_pass": self.context_to_pass,
            "priority": self.priority.as_str(),
        })
    }
}

/// Outcome of interpreting the model's routing reply.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteParse {
    Decided(RoutingDecision),
    Fallback { reason: String },
}

/// Interpret a model reply as a routing decision. JSON wrapped in prose is
/// accepted; a blank target, non-object context or unknown priority is not.
pub fn parse_routing_decision(raw: &str) -> RouteParse {
    let Some(object) = extract_json_object(raw) else {
        return RouteParse::Fallback {
            reason: "response is not a JSON object".to_string(),
        };
    };

    match serde_json::from_value::<RoutingDecision>(Value::Object(object)) {
        Ok(decision) if decision.target_agent.trim().is_empty() => RouteParse::Fallback {
            reason: "empty target_agent".to_string(),
        },
        Ok(decision) => RouteParse::Decided(decision),
        Err(e) => RouteParse::Fallback {
            reason: format!("invalid routing decision: {}", e),
        },
    }
}

/// Central router. Routes requests into the registry and runs multi-step
/// workflows across it.
pub struct Orchestrator {
    core: AgentCore,
    registry: Arc<AgentRegistry>,
    audit: Arc<dyn AuditSink>,
    workflows: WorkflowEngine,
    default_agent: String,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        audit: Arc<dyn AuditSink>,
        llm: Arc<dyn LanguageModel>,
        settings: &Settings,
    ) -> Self {
        let core = AgentCore::new(ORCHESTRATOR_ID, ORCHESTRATOR_PROMPT, llm, &settings.llm)
            .with_description("Routes requests to specialized agents and runs workflows")
            .with_temperature(0.3)
            .with_max_tokens(500);

        let default_agent = if settings.agents.default_agent.trim().is_empty() {
            FALLBACK_AGENT.to_string()
        } else {
            settings.agents.default_agent.clone()
        };

        Self {
            core,
            workflows: WorkflowEngine::new(registry.clone()),
            registry,
            audit,
            default_agent,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Decide which agent handles `request`. Always returns a decision.
    pub async fn analyze_and_route(&self, request: &AgentRequest) -> RoutingDecision {
        if let Some(intent) = request.payload_str("intent").filter(|i| !i.is_empty()) {
            let target = route_for_intent(intent).unwrap_or(self.default_agent.as_str());
            tracing::debug!("[Orchestrator] Explicit intent '{}' -> {}", intent, target);
            return RoutingDecision::new(target, format!("Explicit intent: {}", intent));
        }

        let message = request.payload_str("message").unwrap_or_default();
        let messages = vec![
            self.core.system_message(None),
            ChatMessage::user(format!(
                "User message: {}\n\nDetermine which agent should handle this request.",
                message
            )),
        ];

        let reply = self
            .core
            .call_llm(messages, &[], Some(ResponseFormat::JsonObject), None)
            .await;

        if !reply.success {
            tracing::warn!(
                "[Orchestrator] Routing analysis failed: {}",
                reply.error_message()
            );
            return RoutingDecision::fallback(&self.default_agent, &reply.error_message());
        }

        match parse_routing_decision(reply.content.as_deref().unwrap_or_default()) {
            RouteParse::Decided(decision) => decision,
            RouteParse::Fallback { reason } => {
                tracing::warn!("[Orchestrator] Unusable routing reply: {}", reason);
                RoutingDecision::fallback(&self.default_agent, &reason)
            }
        }
    }

    async fn dispatch(&self, request: &AgentRequest, started: Instant) -> AgentResponse {
        let decision = self.analyze_and_route(request).await;
        tracing::info!(
            "[Orchestrator] Routing to '{}' ({}) - Reason: {}",
            decision.target_agent,
            decision.priority.as_str(),
            decision.reasoning
        );

        let mut payload = request.payload.clone();
        for (key, value) in &decision.context_to_pass {
            payload.insert(key.clone(), value.clone());
        }
        let routed = AgentRequest {
            payload,
            ..request.clone()
        };

        let response = match self.registry.get(&decision.target_agent) {
            Some(agent) => {
                let response = process_guarded(agent.as_ref(), &routed).await;
                if response.error_code == Some(ErrorCode::OrchestrationError) {
                    response.with_metadata(
                        "latency_ms",
                        json!(started.elapsed().as_millis() as u64),
                    )
                } else {
                    response
                }
            }
            None => {
                tracing::error!(
                    "[Orchestrator] Agent '{}' not found",
                    decision.target_agent
                );
                AgentResponse::failure(
                    ErrorCode::AgentNotFound,
                    format!("Agent {} not found", decision.target_agent),
                )
                .with_data_field("routing_decision", decision.to_json())
            }
        };

        let response = response
            .with_metadata("routing", decision.to_json())
            .with_metadata("orchestrated_at", json!(Utc::now().to_rfc3339()));

        self.record_action(&decision.target_agent, &routed, &response, started)
            .await;
        response
    }

    async fn record_action(
        &self,
        agent_id: &str,
        request: &AgentRequest,
        response: &AgentResponse,
        started: Instant,
    ) {
        let record = ActionRecord {
            agent_id: agent_id.to_string(),
            user_id: request.user_id.clone(),
            conversation_id: request.conversation_id.clone(),
            success: response.success,
            error_code: response.error_code_str().map(str::to_string),
            latency_ms: started.elapsed().as_millis() as u64,
            tokens: response.usage(),
            recorded_at: Utc::now(),
        };

        if let Err(e) = self.audit.log_action(&record).await {
            tracing::warn!("[Orchestrator] Failed to record action: {}", e);
        }
    }

    /// Run `steps` in order with shared context. See [`WorkflowEngine::execute`].
    pub async fn execute_workflow(
        &self,
        name: &str,
        initial: &AgentRequest,
        steps: &[WorkflowStep],
    ) -> AgentResponse {
        self.workflows.execute(name, initial, steps).await
    }

    /// Run a definition, using its payload as the initial context.
    pub async fn run_workflow(
        &self,
        definition: &WorkflowDefinition,
        template: &AgentRequest,
    ) -> AgentResponse {
        let mut payload = template.payload.clone();
        for (key, value) in &definition.payload {
            payload.insert(key.clone(), value.clone());
        }
        let initial = AgentRequest {
            payload,
            ..template.clone()
        };
        self.execute_workflow(&definition.name, &initial, &definition.steps)
            .await
    }

    pub fn builtin_workflow(name: &str) -> Option<WorkflowDefinition> {
        WorkflowDefinition::builtin(name)
    }
}

#[async_trait]
impl Agent for Orchestrator {
    fn agent_type(&self) -> &str {
        ORCHESTRATOR_ID
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    async fn process(&self, request: &AgentRequest) -> AgentResponse {
        let started = Instant::now();

        match AssertUnwindSafe(self.dispatch(request, started))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                let latency_ms = started.elapsed().as_millis() as u64;
                tracing::error!("[Orchestrator] Dispatch panicked: {}", message);
                AgentResponse::failure(ErrorCode::OrchestrationError, message)
                    .with_metadata("latency_ms", json!(latency_ms))
            }
        }
    }
}
