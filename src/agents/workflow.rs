//! Workflow Engine - sequential multi-agent chains with shared context
//!
//! Each step's response data is merged into a running context that seeds
//! the next step. Execution stops at the first missing agent, or at the
//! first failed step unless that step opts to continue.

use crate::agents::base::process_guarded;
use crate::agents::messages::{AgentRequest, AgentResponse, ErrorCode, Payload};
use crate::agents::registry::AgentRegistry;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

pub const CHECKOUT_WORKFLOW: &str = "checkout";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub agent: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl WorkflowStep {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            payload: Payload::new(),
            continue_on_error: false,
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// A named, reusable workflow, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub payload: Payload,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    pub fn from_json(raw: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(raw).context("invalid workflow definition")?;
        if definition.steps.is_empty() {
            anyhow::bail!("workflow '{}' has no steps", definition.name);
        }
        Ok(definition)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read workflow file {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Workflows shipped with the platform.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            CHECKOUT_WORKFLOW => Some(Self {
                name: CHECKOUT_WORKFLOW.to_string(),
                payload: Payload::new(),
                steps: vec![
                    WorkflowStep::new("compliance_safety").with_payload("check_type", json!("full")),
                    WorkflowStep::new("order_processing").with_payload("action", json!("create")),
                ],
            }),
            _ => None,
        }
    }
}

/// Runs workflows against a shared registry.
#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<AgentRegistry>,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Run `steps` strictly in order. Every step gets the initial caller
    /// identity and metadata with payload = context overlaid by the step's
    /// own payload.
    pub async fn execute(
        &self,
        name: &str,
        initial: &AgentRequest,
        steps: &[WorkflowStep],
    ) -> AgentResponse {
        tracing::info!("[Workflow] Starting '{}' with {} steps", name, steps.len());

        let mut results: Vec<Value> = Vec::with_capacity(steps.len());
        let mut context = initial.payload.clone();

        for (index, step) in steps.iter().enumerate() {
            let Some(agent) = self.registry.get(&step.agent) else {
                tracing::error!(
                    "[Workflow] '{}' step {} names missing agent '{}'",
                    name,
                    index + 1,
                    step.agent
                );
                return AgentResponse::failure(
                    ErrorCode::WorkflowAgentMissing,
                    format!("Agent {} not found in workflow", step.agent),
                )
                .with_data(partial(name, index, results));
            };

            let mut payload = context.clone();
            for (key, value) in &step.payload {
                payload.insert(key.clone(), value.clone());
            }
            let step_request = initial.derive(payload);

            tracing::debug!("[Workflow] '{}' step {} -> {}", name, index + 1, step.agent);
            let result = process_guarded(agent.as_ref(), &step_request).await;
            results.push(json!({
                "agent_id": step.agent,
                "result": result.to_json(),
            }));

            if !result.success {
                if !step.continue_on_error {
                    tracing::warn!(
                        "[Workflow] '{}' failed at step {} ({}): {}",
                        name,
                        index + 1,
                        step.agent,
                        result.error.as_deref().unwrap_or_default()
                    );
                    return AgentResponse::failure(
                        ErrorCode::WorkflowFailed,
                        format!("Workflow failed at step {}", step.agent),
                    )
                    .with_data(partial(name, index, results));
                }
                tracing::info!(
                    "[Workflow] '{}' continuing past failed step {}",
                    name,
                    step.agent
                );
            }

            for (key, value) in result.data {
                context.insert(key, value);
            }
        }

        tracing::info!("[Workflow] '{}' completed", name);
        let mut data = Payload::new();
        data.insert("workflow".to_string(), json!(name));
        data.insert("results".to_string(), Value::Array(results));
        data.insert("final_context".to_string(), Value::Object(context));
        AgentResponse::success(data)
    }
}

fn partial(name: &str, failed_step: usize, results: Vec<Value>) -> Payload {
    let mut data = Payload::new();
    data.insert("workflow".to_string(), json!(name));
    data.insert("failed_step".to_string(), json!(failed_step));
    data.insert("results".to_string(), Value::Array(results));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_from_json_applies_defaults() {
        let definition = WorkflowDefinition::from_json(
            r#"{"name": "restock", "steps": [{"agent": "medicine_search"},
                {"agent": "order_processing", "payload": {"action": "create"}, "continue_on_error": true}]}"#,
        )
        .unwrap();

        assert_eq!(definition.name, "restock");
        assert!(definition.payload.is_empty());
        assert!(!definition.steps[0].continue_on_error);
        assert!(definition.steps[1].continue_on_error);
        assert_eq!(definition.steps[1].payload["action"], "create");
    }

    #[test]
    fn test_definition_rejects_empty_or_malformed() {
        assert!(WorkflowDefinition::from_json(r#"{"name": "x", "steps": []}"#).is_err());
        assert!(WorkflowDefinition::from_json(r#"{"steps": [{"agent": "a"}]}"#).is_err());
        assert!(WorkflowDefinition::from_json("nope").is_err());
    }

    #[test]
    fn test_definition_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(&path, r#"{"name": "one", "steps": [{"agent": "a"}]}"#).unwrap();
        assert_eq!(WorkflowDefinition::from_file(&path).unwrap().steps.len(), 1);
        assert!(WorkflowDefinition::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_builtin_checkout() {
        let checkout = WorkflowDefinition::builtin(CHECKOUT_WORKFLOW).unwrap();
        let agents: Vec<_> = checkout.steps.iter().map(|s| s.agent.as_str()).collect();
        assert_eq!(agents, vec!["compliance_safety", "order_processing"]);
        assert!(WorkflowDefinition::builtin("refund").is_none());
    }
}
