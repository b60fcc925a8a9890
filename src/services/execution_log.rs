// Execution log - one row per completed workflow step, for audit and the session view
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

/// One completed step
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub session_id: String,
    pub step_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub outcome: serde_json::Value,
}

/// Append-only sink for step executions; callers ignore failures
#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    async fn record(&self, entry: &ExecutionRecord) -> Result<(), sqlx::Error>;
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ExecutionLogRow {
    pub node_name: String,
    pub duration: f64,
    pub outcome: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ExecutionLogger {
    pool: SqlitePool,
}

impl ExecutionLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Setup the execution_logs table
    pub async fn setup(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS execution_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                node_name TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration REAL NOT NULL,
                outcome TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_execution_logs_session ON execution_logs(session_id)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("✅ Execution log table setup complete");
        Ok(())
    }

    /// Rows for a session in execution order
    pub async fn get_logs_for_session(&self, session_id: &str) -> Result<Vec<ExecutionLogRow>, sqlx::Error> {
        sqlx::query_as::<_, ExecutionLogRow>(
            r#"
            SELECT node_name, duration, outcome, start_time
            FROM execution_logs
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[async_trait]
impl ExecutionRecorder for ExecutionLogger {
    async fn record(&self, entry: &ExecutionRecord) -> Result<(), sqlx::Error> {
        let duration = (entry.end_time - entry.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let outcome = entry.outcome.to_string();

        sqlx::query(
            r#"
            INSERT INTO execution_logs (session_id, node_name, start_time, end_time, duration, outcome)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.session_id)
        .bind(&entry.step_name)
        .bind(entry.start_time)
        .bind(entry.end_time)
        .bind(duration)
        .bind(outcome)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "📝 Logged {} for session {} ({:.3}s)",
            entry.step_name,
            entry.session_id,
            duration
        );
        Ok(())
    }
}
