//! Agent Registry
//!
//! Identifier → agent lookup shared by the orchestrator and the workflow
//! engine. Entries are only ever added or replaced, never removed.

use super::base::Agent;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent` under `id`; a later registration wins.
    pub fn register(&self, id: impl Into<String>, agent: Arc<dyn Agent>) {
        let id = id.into();
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.insert(id.clone(), agent).is_some() {
            tracing::warn!("[AgentRegistry] Replaced agent: {}", id);
        } else {
            tracing::info!("[AgentRegistry] Registered agent: {}", id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Registered identifiers, sorted
    pub fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::messages::{AgentRequest, AgentResponse, Payload};
    use async_trait::async_trait;
    use serde_json::json;

    struct Named(&'static str);

    #[async_trait]
    impl Agent for Named {
        fn agent_type(&self) -> &str {
            self.0
        }

        async fn process(&self, _request: &AgentRequest) -> AgentResponse {
            AgentResponse::success(Payload::new()).with_data_field("from", json!(self.0))
        }
    }

    #[test]
    fn test_register_get_and_list() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());

        registry.register("medicine_search", Arc::new(Named("medicine_search")));
        registry.register("customer_support", Arc::new(Named("customer_support")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("medicine_search"));
        assert!(registry.get("payment").is_none());
        assert_eq!(
            registry.list_ids(),
            vec!["customer_support".to_string(), "medicine_search".to_string()]
        );
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let registry = AgentRegistry::new();
        registry.register("support", Arc::new(Named("first")));
        registry.register("support", Arc::new(Named("second")));

        let agent = registry.get("support").unwrap();
        let response = agent.process(&AgentRequest::default()).await;
        assert_eq!(response.data["from"], "second");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_registration_and_lookup() {
        let registry = Arc::new(AgentRegistry::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("agent_{}", i);
                registry.register(id.clone(), Arc::new(Named("worker")));
                registry.get(&id).is_some()
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(registry.len(), 8);
    }
}
