//! rxmesh - multi-agent orchestration core for an online pharmacy assistant
//!
//! A central orchestrator routes requests to specialized agents (support,
//! medicine search, prescription intake, order processing, compliance) and
//! chains them into workflows with shared context.

pub mod agents;
pub mod cli;
pub mod config;
pub mod core;
pub mod services;
pub mod storage;
pub mod tools;
pub mod utils;

pub use agents::{
    register_agents, Agent, AgentDeps, AgentRegistry, AgentRequest, AgentResponse, ErrorCode,
    Orchestrator, RoutingDecision, WorkflowDefinition, WorkflowStep,
};
pub use config::Settings;
pub use crate::core::llm::{LanguageModel, OpenAiClient};
pub use storage::{ActionRecord, AuditSink};

use std::sync::Arc;

/// A bootstrapped system: populated registry plus the orchestrator over it.
pub struct System {
    settings: Settings,
    registry: Arc<AgentRegistry>,
    orchestrator: Orchestrator,
}

impl System {
    /// Register the specialized agents (sample collaborators) and build the
    /// orchestrator over them.
    pub fn bootstrap(
        settings: Settings,
        llm: Arc<dyn LanguageModel>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let deps = AgentDeps::with_samples(llm, settings);
        Self::with_deps(deps, audit)
    }

    /// Like [`System::bootstrap`] with caller-supplied collaborators.
    pub fn with_deps(deps: AgentDeps, audit: Arc<dyn AuditSink>) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        register_agents(&registry, &deps);

        let orchestrator =
            Orchestrator::new(registry.clone(), audit, deps.llm.clone(), &deps.settings);

        tracing::info!(
            "rxmesh system initialized with {} agents",
            registry.len()
        );

        Self {
            settings: deps.settings,
            registry,
            orchestrator,
        }
    }

    /// OpenAI client and the configured audit backend.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let api_key = Settings::api_key()?;
        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::new(api_key, &settings.llm));
        let audit = storage::build_audit_sink(&settings.audit)?;
        Ok(Self::bootstrap(settings, llm, audit))
    }

    /// Layered settings from files and environment, then [`System::from_settings`].
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = Settings::new()?;
        Self::from_settings(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Route one request through the orchestrator.
    pub async fn process(&self, request: &AgentRequest) -> AgentResponse {
        self.orchestrator.process(request).await
    }
}
