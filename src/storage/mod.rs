//! Audit Storage Abstraction
//!
//! Information Hiding:
//! - Storage backend implementation details hidden behind trait
//! - Allows swapping between log, memory and SQLite without API changes
//! - Each sink encapsulates its own data structures and protocols

use crate::config::{AuditBackend, AuditConfig};
use crate::core::llm::TokenUsage;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryAuditSink;
pub use sqlite::SqliteAuditSink;

/// One dispatched request, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub agent_id: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub success: bool,
    pub error_code: Option<String>,
    pub latency_ms: u64,
    pub tokens: TokenUsage,
    pub recorded_at: DateTime<Utc>,
}

/// Destination for audit records. Failures are reported to the caller,
/// which decides whether they matter.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_action(&self, record: &ActionRecord) -> Result<()>;

    /// Most recent records first. Sinks that do not retain records return none.
    async fn recent(&self, _limit: usize) -> Result<Vec<ActionRecord>> {
        Ok(Vec::new())
    }
}

/// Writes each record as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_action(&self, record: &ActionRecord) -> Result<()> {
        tracing::info!(
            agent_id = %record.agent_id,
            user_id = ?record.user_id,
            conversation_id = ?record.conversation_id,
            success = record.success,
            error_code = ?record.error_code,
            latency_ms = record.latency_ms,
            input_tokens = record.tokens.input_tokens,
            output_tokens = record.tokens.output_tokens,
            "agent_action"
        );
        Ok(())
    }
}

/// Build the sink selected by configuration.
pub fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>> {
    let sink: Arc<dyn AuditSink> = match config.backend {
        AuditBackend::Log => Arc::new(TracingAuditSink),
        AuditBackend::Memory => Arc::new(MemoryAuditSink::new()),
        AuditBackend::Sqlite => Arc::new(SqliteAuditSink::open(&config.sqlite_path)?),
    };
    tracing::debug!("[Storage] Audit backend: {:?}", config.backend);
    Ok(sink)
}

#[cfg(test)]
pub(crate) fn sample_record(agent_id: &str, success: bool) -> ActionRecord {
    ActionRecord {
        agent_id: agent_id.to_string(),
        user_id: Some("user-1".to_string()),
        conversation_id: None,
        success,
        error_code: if success {
            None
        } else {
            Some("LLM_ERROR".to_string())
        },
        latency_ms: 12,
        tokens: TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        },
        recorded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_sink_accepts_records() {
        let sink = TracingAuditSink;
        sink.log_action(&sample_record("customer_support", true))
            .await
            .unwrap();
        assert!(sink.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_memory_sink_from_config() {
        let config = AuditConfig {
            backend: AuditBackend::Memory,
            ..AuditConfig::default()
        };
        let sink = build_audit_sink(&config).unwrap();
        sink.log_action(&sample_record("medicine_search", true))
            .await
            .unwrap();
        assert_eq!(sink.recent(10).await.unwrap().len(), 1);
    }
}
