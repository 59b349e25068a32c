//! In-Memory Audit Sink
//!
//! Information Hiding:
//! - Vec storage structure hidden from users
//! - Thread-safe access via RwLock hidden behind async interface
//! - Suitable for testing and introspection

use super::{ActionRecord, AuditSink};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Records are lost when the process terminates
#[derive(Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<RwLock<Vec<ActionRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record in insertion order
    pub async fn records(&self) -> Vec<ActionRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_action(&self, record: &ActionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record.clone());
        tracing::debug!(
            "[MemoryAuditSink] Stored action for '{}' ({} total)",
            record.agent_id,
            records.len()
        );
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ActionRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sample_record;

    #[tokio::test]
    async fn test_store_and_list() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty().await);

        sink.log_action(&sample_record("a", true)).await.unwrap();
        sink.log_action(&sample_record("b", false)).await.unwrap();

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent_id, "a");
        assert!(!records[1].success);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let sink = MemoryAuditSink::new();
        for id in ["a", "b", "c"] {
            sink.log_action(&sample_record(id, true)).await.unwrap();
        }

        let recent = sink.recent(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let sink = MemoryAuditSink::new();
        let clone = sink.clone();
        clone.log_action(&sample_record("x", true)).await.unwrap();
        assert_eq!(sink.len().await, 1);
    }
}
