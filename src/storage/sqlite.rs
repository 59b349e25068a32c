//! SQLite Audit Sink
//!
//! One `agent_actions` table. rusqlite is blocking, so every statement runs
//! on the blocking pool behind a shared connection.

use super::{ActionRecord, AuditSink};
use crate::core::llm::TokenUsage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditSink {
    /// Open (or create) the database at `path`. `:memory:` opens a private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)
                .with_context(|| format!("failed to open audit database at {}", path))?
        };
        Self::init_schema(&conn)?;
        tracing::info!("[SqliteAuditSink] Audit database ready at {}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS agent_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id TEXT NOT NULL,
                user_id TEXT,
                conversation_id TEXT,
                success INTEGER NOT NULL,
                error_code TEXT,
                latency_ms INTEGER NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                recorded_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_agent_actions_agent ON agent_actions(agent_id, recorded_at DESC)",
            [],
        )?;
        Ok(())
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&conn)
        })
        .await
        .context("audit database task failed")?
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRecord> {
    let recorded_at: String = row.get(9)?;
    let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(ActionRecord {
        agent_id: row.get(0)?,
        user_id: row.get(1)?,
        conversation_id: row.get(2)?,
        success: row.get::<_, i64>(3)? != 0,
        error_code: row.get(4)?,
        latency_ms: row.get::<_, i64>(5)?.max(0) as u64,
        tokens: TokenUsage {
            input_tokens: row.get(6)?,
            output_tokens: row.get(7)?,
            total_tokens: row.get(8)?,
        },
        recorded_at,
    })
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn log_action(&self, record: &ActionRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO agent_actions (
                    agent_id, user_id, conversation_id, success, error_code, latency_ms,
                    input_tokens, output_tokens, total_tokens, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.agent_id,
                    record.user_id,
                    record.conversation_id,
                    record.success as i64,
                    record.error_code,
                    record.latency_ms as i64,
                    record.tokens.input_tokens,
                    record.tokens.output_tokens,
                    record.tokens.total_tokens,
                    record.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ActionRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT agent_id, user_id, conversation_id, success, error_code, latency_ms,
                        input_tokens, output_tokens, total_tokens, recorded_at
                 FROM agent_actions ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], row_to_record)?;
            let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sample_record;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.db");
        let path = path.to_str().unwrap();

        {
            let sink = SqliteAuditSink::open(path).unwrap();
            sink.log_action(&sample_record("order_processing", true))
                .await
                .unwrap();
            sink.log_action(&sample_record("compliance_safety", false))
                .await
                .unwrap();
        }

        let sink = SqliteAuditSink::open(path).unwrap();
        let recent = sink.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].agent_id, "compliance_safety");
        assert!(!recent[0].success);
        assert_eq!(recent[0].error_code.as_deref(), Some("LLM_ERROR"));
        assert_eq!(recent[1].tokens.total_tokens, 15);
        assert_eq!(recent[1].user_id.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_in_memory_database_and_limit() {
        let sink = SqliteAuditSink::open(":memory:").unwrap();
        for _ in 0..5 {
            sink.log_action(&sample_record("customer_support", true))
                .await
                .unwrap();
        }
        assert_eq!(sink.recent(3).await.unwrap().len(), 3);
    }
}
