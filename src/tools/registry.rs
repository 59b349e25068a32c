//! Tool Registry
//!
//! Information Hiding:
//! - Tool storage and lookup implementation hidden
//! - Each agent owns its registry; registries are never shared between agents

use super::{Tool, ToolMetadata};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-agent set of tools, keyed by tool name
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name;
        tracing::debug!("Registering tool: {}", name);
        self.tools.insert(name, tool);
    }

    /// Builder-style registration
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Tool names in sorted order
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        self.tools.values().map(|tool| tool.metadata()).collect()
    }

    /// Function specs for the `tools` field of a completion request
    pub fn openai_functions(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| tool.metadata().to_openai_function())
            .collect()
    }

    /// Human-readable description of every tool and its parameters
    pub fn tools_description(&self) -> String {
        let mut descriptions = Vec::new();
        for tool in self.tools.values() {
            let metadata = tool.metadata();
            let params = metadata
                .parameters
                .iter()
                .map(|p| {
                    let required = if p.required { "required" } else { "optional" };
                    match &p.enum_values {
                        Some(values) => format!(
                            "  - {} ({}, one of {}): {} [{}]",
                            p.name,
                            p.param_type,
                            values.join("|"),
                            p.description,
                            required
                        ),
                        None => format!(
                            "  - {} ({}): {} [{}]",
                            p.name, p.param_type, p.description, required
                        ),
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");

            descriptions.push(format!(
                "Tool: {}\nDescription: {}\nParameters:\n{}",
                metadata.name, metadata.description, params
            ));
        }
        descriptions.join("\n\n")
    }
}
