// Checkpointing - Persist and resume sessions (LangGraph-inspired)
use super::error::StoreError;
use super::state::WorkflowState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Raw checkpoint row: serialized state plus the next-step pointer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    pub thread_id: String,
    pub workflow: String,
    pub state: serde_json::Value,
    pub next_steps: Vec<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Expected row version for a conditional write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteGuard {
    /// Overwrite whatever is there
    Any,
    /// Only insert; fail if a row already exists
    Absent,
    /// Only update the row at exactly this version
    Version(i64),
}

/// Durable storage for one checkpoint row per session
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, thread_id: &str) -> Result<Option<StoredCheckpoint>, StoreError>;

    /// Write state and pointer together; returns the new version
    async fn put(
        &self,
        workflow: &str,
        thread_id: &str,
        state: &serde_json::Value,
        next_steps: &[String],
        guard: WriteGuard,
    ) -> Result<i64, StoreError>;

    /// Thread ids for a workflow, most recently updated first
    async fn list_threads(&self, workflow: &str) -> Result<Vec<String>, StoreError>;

    async fn delete(&self, thread_id: &str) -> Result<bool, StoreError>;
}

/// SQLite-backed checkpoint store
#[derive(Clone)]
pub struct SqliteCheckpointer {
    pool: SqlitePool,
}

impl SqliteCheckpointer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Setup checkpoint table
    pub async fn setup(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_checkpoints (
                thread_id TEXT PRIMARY KEY,
                workflow TEXT NOT NULL,
                state TEXT NOT NULL,
                next_steps TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_workflow_checkpoints_workflow
            ON workflow_checkpoints(workflow, updated_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("✅ Workflow checkpoint table setup complete");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    thread_id: String,
    workflow: String,
    state: String,
    next_steps: String,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CheckpointRow> for StoredCheckpoint {
    type Error = StoreError;

    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        Ok(StoredCheckpoint {
            thread_id: row.thread_id,
            workflow: row.workflow,
            state: serde_json::from_str(&row.state)?,
            next_steps: serde_json::from_str(&row.next_steps)?,
            version: row.version,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<StoredCheckpoint>, StoreError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT thread_id, workflow, state, next_steps, version, updated_at
            FROM workflow_checkpoints
            WHERE thread_id = ?
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredCheckpoint::try_from).transpose()
    }

    async fn put(
        &self,
        workflow: &str,
        thread_id: &str,
        state: &serde_json::Value,
        next_steps: &[String],
        guard: WriteGuard,
    ) -> Result<i64, StoreError> {
        let state_json = serde_json::to_string(state)?;
        let next_json = serde_json::to_string(next_steps)?;
        let now = Utc::now();

        // Single statement per write so state and pointer are never observed apart
        let version: Option<i64> = match guard {
            WriteGuard::Any => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO workflow_checkpoints
                    (thread_id, workflow, state, next_steps, version, updated_at)
                    VALUES (?, ?, ?, ?, 1, ?)
                    ON CONFLICT(thread_id) DO UPDATE SET
                        workflow = excluded.workflow,
                        state = excluded.state,
                        next_steps = excluded.next_steps,
                        version = workflow_checkpoints.version + 1,
                        updated_at = excluded.updated_at
                    RETURNING version
                    "#,
                )
                .bind(thread_id)
                .bind(workflow)
                .bind(&state_json)
                .bind(&next_json)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            WriteGuard::Absent => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO workflow_checkpoints
                    (thread_id, workflow, state, next_steps, version, updated_at)
                    VALUES (?, ?, ?, ?, 1, ?)
                    ON CONFLICT(thread_id) DO NOTHING
                    RETURNING version
                    "#,
                )
                .bind(thread_id)
                .bind(workflow)
                .bind(&state_json)
                .bind(&next_json)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            WriteGuard::Version(expected) => {
                sqlx::query_scalar::<_, i64>(
                    r#"
                    UPDATE workflow_checkpoints
                    SET state = ?, next_steps = ?, version = version + 1, updated_at = ?
                    WHERE thread_id = ? AND version = ?
                    RETURNING version
                    "#,
                )
                .bind(&state_json)
                .bind(&next_json)
                .bind(now)
                .bind(thread_id)
                .bind(expected)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        let version = version.ok_or_else(|| StoreError::VersionConflict {
            thread_id: thread_id.to_string(),
        })?;

        debug!("💾 Checkpoint saved: {} (version: {})", thread_id, version);
        Ok(version)
    }

    async fn list_threads(&self, workflow: &str) -> Result<Vec<String>, StoreError> {
        let threads = sqlx::query_scalar::<_, String>(
            r#"
            SELECT thread_id FROM workflow_checkpoints
            WHERE workflow = ?
            ORDER BY updated_at DESC, thread_id DESC
            "#,
        )
        .bind(workflow)
        .fetch_all(&self.pool)
        .await?;

        Ok(threads)
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM workflow_checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-process checkpoint store; same contract as the SQLite one
#[derive(Default)]
pub struct InMemoryCheckpointer {
    rows: RwLock<HashMap<String, StoredCheckpoint>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<StoredCheckpoint>, StoreError> {
        Ok(self.rows.read().await.get(thread_id).cloned())
    }

    async fn put(
        &self,
        workflow: &str,
        thread_id: &str,
        state: &serde_json::Value,
        next_steps: &[String],
        guard: WriteGuard,
    ) -> Result<i64, StoreError> {
        let mut rows = self.rows.write().await;
        let current = rows.get(thread_id).map(|row| row.version);

        let allowed = match (guard, current) {
            (WriteGuard::Any, _) => true,
            (WriteGuard::Absent, None) => true,
            (WriteGuard::Version(expected), Some(found)) => expected == found,
            _ => false,
        };
        if !allowed {
            return Err(StoreError::VersionConflict {
                thread_id: thread_id.to_string(),
            });
        }

        let version = current.unwrap_or(0) + 1;
        rows.insert(
            thread_id.to_string(),
            StoredCheckpoint {
                thread_id: thread_id.to_string(),
                workflow: workflow.to_string(),
                state: state.clone(),
                next_steps: next_steps.to_vec(),
                version,
                updated_at: Utc::now(),
            },
        );
        Ok(version)
    }

    async fn list_threads(&self, workflow: &str) -> Result<Vec<String>, StoreError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<&StoredCheckpoint> =
            rows.values().filter(|row| row.workflow == workflow).collect();
        matching.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.thread_id.cmp(&a.thread_id))
        });
        Ok(matching.into_iter().map(|row| row.thread_id.clone()).collect())
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, StoreError> {
        Ok(self.rows.write().await.remove(thread_id).is_some())
    }
}

/// Checkpoint - typed snapshot of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkpoint<S> {
    pub thread_id: String,
    pub state: S,
    pub next_steps: Vec<String>,
    /// 0 when the session has never been saved
    pub version: i64,
}

impl<S> Checkpoint<S> {
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    pub fn pending_step(&self) -> Option<&str> {
        self.next_steps.first().map(String::as_str)
    }

    /// Guard that only succeeds if the row is still what was loaded
    pub fn write_guard(&self) -> WriteGuard {
        if self.exists() {
            WriteGuard::Version(self.version)
        } else {
            WriteGuard::Absent
        }
    }
}

/// Typed load/save/merge over a `CheckpointStore` for one workflow
pub struct WorkflowCheckpointer<S: WorkflowState> {
    store: Arc<dyn CheckpointStore>,
    entry_point: String,
    _state: PhantomData<fn() -> S>,
}

impl<S: WorkflowState> WorkflowCheckpointer<S> {
    pub fn new(store: Arc<dyn CheckpointStore>, entry_point: &str) -> Self {
        Self {
            store,
            entry_point: entry_point.to_string(),
            _state: PhantomData,
        }
    }

    /// Load a session; unknown sessions yield default state pointed at the entry step
    pub async fn load(&self, thread_id: &str) -> Result<Checkpoint<S>, StoreError> {
        match self.store.get(thread_id).await? {
            Some(row) => self.decode(row),
            None => Ok(Checkpoint {
                thread_id: thread_id.to_string(),
                state: S::default(),
                next_steps: vec![self.entry_point.clone()],
                version: 0,
            }),
        }
    }

    pub async fn save(
        &self,
        thread_id: &str,
        state: &S,
        next_steps: &[String],
    ) -> Result<i64, StoreError> {
        self.save_guarded(thread_id, state, next_steps, WriteGuard::Any).await
    }

    /// Conditional save; `VersionConflict` when the row moved past `guard`
    pub async fn save_guarded(
        &self,
        thread_id: &str,
        state: &S,
        next_steps: &[String],
        guard: WriteGuard,
    ) -> Result<i64, StoreError> {
        let value = serde_json::to_value(state)?;
        self.store
            .put(S::WORKFLOW, thread_id, &value, next_steps, guard)
            .await
    }

    /// Apply a partial update on top of a loaded checkpoint, only if nobody wrote since
    pub async fn merge_into(
        &self,
        mut checkpoint: Checkpoint<S>,
        update: S::Update,
    ) -> Result<Checkpoint<S>, StoreError> {
        checkpoint.state.apply_update(update);
        checkpoint.version = self
            .save_guarded(
                &checkpoint.thread_id,
                &checkpoint.state,
                &checkpoint.next_steps,
                checkpoint.write_guard(),
            )
            .await?;
        Ok(checkpoint)
    }

    /// Apply a partial update to the stored state without moving the pointer
    pub async fn merge(&self, thread_id: &str, update: S::Update) -> Result<Checkpoint<S>, StoreError> {
        const MAX_ATTEMPTS: usize = 5;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let checkpoint = self.load(thread_id).await?;
            match self.merge_into(checkpoint, update.clone()).await {
                Ok(merged) => return Ok(merged),
                Err(StoreError::VersionConflict { .. }) if attempt < MAX_ATTEMPTS => {
                    debug!("🔁 Merge conflict on {} (attempt {}), reloading", thread_id, attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn list_threads(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_threads(S::WORKFLOW).await
    }

    pub async fn delete(&self, thread_id: &str) -> Result<bool, StoreError> {
        self.store.delete(thread_id).await
    }

    fn decode(&self, row: StoredCheckpoint) -> Result<Checkpoint<S>, StoreError> {
        if row.workflow != S::WORKFLOW {
            return Err(StoreError::WorkflowMismatch {
                thread_id: row.thread_id,
                expected: S::WORKFLOW.to_string(),
                found: row.workflow,
            });
        }

        Ok(Checkpoint {
            thread_id: row.thread_id,
            state: serde_json::from_value(row.state)?,
            next_steps: row.next_steps,
            version: row.version,
        })
    }
}
