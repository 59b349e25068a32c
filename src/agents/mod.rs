pub mod base;
pub mod messages;
pub mod registry;
pub mod orchestrator;
pub mod workflow;
pub mod factory;
pub mod customer_support;
pub mod medicine_search;
pub mod prescription_validation;
pub mod order_processing;
pub mod compliance_safety;

pub use base::{process_guarded, Agent, AgentCore};
pub use factory::{register_agents, AgentDeps};
pub use messages::{AgentRequest, AgentResponse, ErrorCode, Payload, Priority};
pub use orchestrator::{Orchestrator, RoutingDecision};
pub use registry::AgentRegistry;
pub use workflow::{WorkflowDefinition, WorkflowEngine, WorkflowStep};
