use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LLMConfig,
    pub agents: AgentsConfig,
    pub orders: OrdersConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_base: String,
    /// Per-attempt deadline for a single completion call.
    pub timeout_ms: u64,
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-1106-preview".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            api_base: "https://api.openai.com/v1".to_string(),
            timeout_ms: 30_000,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Destination for unknown intents and for any routing the model could not decide.
    pub default_agent: String,
    pub max_tool_rounds: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_agent: "customer_support".to_string(),
            max_tool_rounds: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersConfig {
    pub tax_rate: f64,
    pub free_shipping_threshold: f64,
    pub shipping_fee: f64,
    pub max_quantity_per_item: i64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.08,
            free_shipping_threshold: 35.0,
            shipping_fee: 5.99,
            max_quantity_per_item: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    Log,
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    pub sqlite_path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::Log,
            sqlite_path: "./rxmesh-audit.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Layered load: built-in defaults, then `config/{CONFIG_ENV}`, then `APP__*` variables.
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn api_key() -> Result<String> {
        env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))
    }
}
