mod settings;

pub use settings::{
    AgentsConfig, AuditBackend, AuditConfig, LLMConfig, LoggingConfig, OrdersConfig, Settings,
};
