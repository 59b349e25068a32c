//! Factory for the five specialized pharmacy agents
//!
//! Information Hiding:
//! - Hides per-agent collaborator wiring
//! - Callers supply one `AgentDeps` and get registered agents back

use super::base::Agent;
use super::compliance_safety::{self, ComplianceSafetyAgent};
use super::customer_support::{self, CustomerSupportAgent};
use super::medicine_search::{self, MedicineSearchAgent};
use super::order_processing::{self, OrderDesk, OrderProcessingAgent};
use super::prescription_validation::{self, PrescriptionValidationAgent};
use super::registry::AgentRegistry;
use crate::config::Settings;
use crate::core::llm::LanguageModel;
use crate::services::{
    DocumentReader, InventoryService, MedicineCatalog, PricingPolicy, SampleCatalog,
    SampleDocumentReader, StandardPricing, StaticInventory,
};
use std::sync::Arc;

/// Stock level the sample inventory reports for every medicine.
const SAMPLE_STOCK: i64 = 100;

/// Everything the specialized agents are built from.
#[derive(Clone)]
pub struct AgentDeps {
    pub llm: Arc<dyn LanguageModel>,
    pub settings: Settings,
    pub catalog: Arc<dyn MedicineCatalog>,
    pub documents: Arc<dyn DocumentReader>,
    pub pricing: Arc<dyn PricingPolicy>,
    pub inventory: Arc<dyn InventoryService>,
}

impl AgentDeps {
    /// Sample catalog, document reader and inventory; pricing from `settings.orders`.
    pub fn with_samples(llm: Arc<dyn LanguageModel>, settings: Settings) -> Self {
        let pricing = Arc::new(StandardPricing::new(&settings.orders));
        Self {
            llm,
            catalog: Arc::new(SampleCatalog::new()),
            documents: Arc::new(SampleDocumentReader),
            pricing,
            inventory: Arc::new(StaticInventory::new(SAMPLE_STOCK)),
            settings,
        }
    }
}

pub fn create_customer_support_agent(deps: &AgentDeps) -> Arc<dyn Agent> {
    Arc::new(CustomerSupportAgent::new(deps.llm.clone(), &deps.settings))
}

pub fn create_medicine_search_agent(deps: &AgentDeps) -> Arc<dyn Agent> {
    Arc::new(MedicineSearchAgent::new(
        deps.llm.clone(),
        &deps.settings,
        deps.catalog.clone(),
    ))
}

pub fn create_prescription_validation_agent(deps: &AgentDeps) -> Arc<dyn Agent> {
    Arc::new(PrescriptionValidationAgent::new(
        deps.llm.clone(),
        &deps.settings,
        deps.documents.clone(),
    ))
}

pub fn create_order_processing_agent(deps: &AgentDeps) -> Arc<dyn Agent> {
    let desk = OrderDesk::new(
        deps.catalog.clone(),
        deps.pricing.clone(),
        deps.inventory.clone(),
        deps.settings.orders.max_quantity_per_item,
    );
    Arc::new(OrderProcessingAgent::new(deps.llm.clone(), &deps.settings, desk))
}

pub fn create_compliance_safety_agent(deps: &AgentDeps) -> Arc<dyn Agent> {
    Arc::new(ComplianceSafetyAgent::new(
        deps.llm.clone(),
        &deps.settings,
        deps.catalog.clone(),
    ))
}

/// Register every specialized agent under its canonical id.
///
/// Re-running is safe: the last registration for an id wins, so agents
/// registered beforehand under the same ids are replaced.
pub fn register_agents(registry: &AgentRegistry, deps: &AgentDeps) {
    let factories: [(&str, fn(&AgentDeps) -> Arc<dyn Agent>); 5] = [
        (customer_support::AGENT_ID, create_customer_support_agent),
        (medicine_search::AGENT_ID, create_medicine_search_agent),
        (
            prescription_validation::AGENT_ID,
            create_prescription_validation_agent,
        ),
        (order_processing::AGENT_ID, create_order_processing_agent),
        (compliance_safety::AGENT_ID, create_compliance_safety_agent),
    ];

    for (id, create) in factories {
        registry.register(id, create(deps));
    }
    tracing::debug!("[AgentFactory] Registered {} agents", factories.len());
}
