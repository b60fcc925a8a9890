// Executor - Runs the workflow graph with per-step checkpoints and review pauses
use super::checkpoint::{Checkpoint, CheckpointStore, WorkflowCheckpointer, WriteGuard};
use super::error::{StoreError, WorkflowError};
use super::graph::{StateGraph, Target};
use super::state::WorkflowState;
use crate::services::execution_log::{ExecutionRecord, ExecutionRecorder};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

/// Workflow executor config
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on steps executed by one start/resume call
    pub max_steps_per_run: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: 50,
        }
    }
}

/// Where a session stands between engine calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Nothing persisted yet
    New,
    /// Halted before an interrupt anchor, awaiting human input
    Paused,
    /// A run stopped on an error; the pending step will be retried on resume
    Stranded,
    /// Terminal: no next step
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot<S> {
    pub thread_id: String,
    pub state: S,
    pub next_steps: Vec<String>,
    pub status: SessionStatus,
    pub version: i64,
}

impl<S> SessionSnapshot<S> {
    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Paused
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn pending_step(&self) -> Option<&str> {
        match self.status {
            SessionStatus::Completed => None,
            _ => self.next_steps.first().map(String::as_str),
        }
    }
}

/// Result of one start/resume call
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<S> {
    pub snapshot: SessionSnapshot<S>,
    /// Steps executed by this call, in order
    pub executed: Vec<String>,
}

type SessionLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Exclusive hold on one session; drops map entries nobody is using on release
struct SessionLease<'a> {
    locks: &'a SessionLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Workflow executor
pub struct WorkflowExecutor<S: WorkflowState> {
    graph: StateGraph<S>,
    checkpointer: WorkflowCheckpointer<S>,
    recorder: Option<Arc<dyn ExecutionRecorder>>,
    config: ExecutorConfig,
    session_locks: SessionLocks,
}

impl<S: WorkflowState> WorkflowExecutor<S> {
    pub fn new(
        graph: StateGraph<S>,
        store: Arc<dyn CheckpointStore>,
        recorder: Option<Arc<dyn ExecutionRecorder>>,
        config: ExecutorConfig,
    ) -> Self {
        let checkpointer = WorkflowCheckpointer::new(store, graph.entry_point());
        Self {
            graph,
            checkpointer,
            recorder,
            config,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn graph(&self) -> &StateGraph<S> {
        &self.graph
    }

    /// Merge the initial input and run from the entry step
    pub async fn start(&self, thread_id: &str, input: S::Update) -> Result<RunReport<S>, WorkflowError> {
        let _lease = self.lock_session(thread_id).await;

        let checkpoint = self.checkpointer.load(thread_id).await?;
        if self.status_of(&checkpoint) == SessionStatus::Paused {
            info!("🔄 Session {} restarted while paused; previous review abandoned", thread_id);
        }

        info!("🚀 Starting {} workflow for session {}", S::WORKFLOW, thread_id);
        let guard = checkpoint.write_guard();
        let mut state = checkpoint.state;
        state.apply_update(input);

        let entry = self.graph.entry_point().to_string();
        let version = self
            .checkpointer
            .save_guarded(thread_id, &state, std::slice::from_ref(&entry), guard)
            .await
            .map_err(|e| self.conflict_warning(thread_id, e))?;

        self.run_from(thread_id, state, entry, version, false).await
    }

    /// Merge human input into a paused session and continue from the pending step
    pub async fn resume(&self, thread_id: &str, patch: S::Update) -> Result<RunReport<S>, WorkflowError> {
        let _lease = self.lock_session(thread_id).await;

        let checkpoint = self.checkpointer.load(thread_id).await?;
        let pending = checkpoint.pending_step().map(str::to_string);

        match (self.status_of(&checkpoint), pending) {
            (SessionStatus::Paused, Some(pending)) => {
                info!("▶️ Resuming session {} at '{}'", thread_id, pending);
                let merged = self
                    .checkpointer
                    .merge_into(checkpoint, patch)
                    .await
                    .map_err(|e| self.conflict_warning(thread_id, e))?;
                self.run_from(thread_id, merged.state, pending, merged.version, true)
                    .await
            }
            (SessionStatus::Stranded, Some(pending)) => {
                // Input was merged before the failed step ran; only the step is retried
                warn!("🔁 Session {} retrying stranded step '{}'", thread_id, pending);
                self.run_from(thread_id, checkpoint.state, pending, checkpoint.version, true)
                    .await
            }
            _ => Err(WorkflowError::NotPaused {
                thread_id: thread_id.to_string(),
            }),
        }
    }

    pub async fn inspect(&self, thread_id: &str) -> Result<SessionSnapshot<S>, WorkflowError> {
        let checkpoint = self.checkpointer.load(thread_id).await?;
        let status = self.status_of(&checkpoint);
        Ok(SessionSnapshot {
            thread_id: checkpoint.thread_id,
            state: checkpoint.state,
            next_steps: checkpoint.next_steps,
            status,
            version: checkpoint.version,
        })
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, WorkflowError> {
        Ok(self.checkpointer.list_threads().await?)
    }

    pub async fn delete_session(&self, thread_id: &str) -> Result<bool, WorkflowError> {
        let _lease = self.lock_session(thread_id).await;
        Ok(self.checkpointer.delete(thread_id).await?)
    }

    fn status_of(&self, checkpoint: &Checkpoint<S>) -> SessionStatus {
        if !checkpoint.exists() {
            return SessionStatus::New;
        }
        match checkpoint.pending_step() {
            None => SessionStatus::Completed,
            Some(step) if self.graph.is_interrupt(step) => SessionStatus::Paused,
            Some(_) => SessionStatus::Stranded,
        }
    }

    async fn lock_session(&self, thread_id: &str) -> SessionLease<'_> {
        let lock = {
            let mut locks = self
                .session_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks.entry(thread_id.to_string()).or_default().clone()
        };
        SessionLease {
            locks: &self.session_locks,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Another executor on the same store wrote this session first
    fn conflict_warning(&self, thread_id: &str, e: StoreError) -> WorkflowError {
        if matches!(e, StoreError::VersionConflict { .. }) {
            warn!("⚠️ Session {} was advanced elsewhere; this run's result is discarded", thread_id);
        }
        e.into()
    }

    /// Execute steps until an interrupt anchor, a terminal edge, or an error.
    /// `resuming` lets the first step run even if it is an interrupt anchor.
    async fn run_from(
        &self,
        thread_id: &str,
        mut state: S,
        mut current: String,
        mut version: i64,
        mut resuming: bool,
    ) -> Result<RunReport<S>, WorkflowError> {
        let mut executed: Vec<String> = Vec::new();

        loop {
            if self.graph.is_interrupt(&current) && !resuming {
                // The last checkpoint already names `current` as pending
                info!("⏸️ Session {} paused before '{}'", thread_id, current);
                return Ok(self.report(thread_id, state, vec![current], SessionStatus::Paused, version, executed));
            }
            resuming = false;

            if executed.len() >= self.config.max_steps_per_run {
                warn!(
                    "⚠️ Session {} hit step limit ({}) at '{}'",
                    thread_id, self.config.max_steps_per_run, current
                );
                return Err(WorkflowError::StepLimitExceeded {
                    limit: self.config.max_steps_per_run,
                });
            }

            let node = self
                .graph
                .get_node(&current)
                .ok_or_else(|| WorkflowError::UnknownStep(current.clone()))?;

            info!("📍 Session {} step {}: executing '{}'", thread_id, executed.len() + 1, current);
            let started = Utc::now();
            let update = node.function.execute(&state).await.map_err(|e| {
                error!("❌ Step '{}' failed for session {}: {}", current, thread_id, e);
                e
            })?;
            let finished = Utc::now();

            let outcome = serde_json::to_value(&update).unwrap_or(serde_json::Value::Null);
            state.apply_update(update);

            let target = self.graph.next_target(&current, &state)?;
            let next_steps = match &target {
                Target::Node(next) => vec![next.clone()],
                Target::End => Vec::new(),
                Target::AwaitInput => vec![current.clone()],
            };

            version = self
                .checkpointer
                .save_guarded(thread_id, &state, &next_steps, WriteGuard::Version(version))
                .await
                .map_err(|e| self.conflict_warning(thread_id, e))?;
            self.record(thread_id, &current, started, finished, outcome).await;
            executed.push(current.clone());

            match target {
                Target::Node(next) => current = next,
                Target::End => {
                    info!("🏁 Session {} completed after '{}'", thread_id, current);
                    return Ok(self.report(thread_id, state, next_steps, SessionStatus::Completed, version, executed));
                }
                Target::AwaitInput => {
                    info!("⏸️ Session {} waiting for input at '{}'", thread_id, current);
                    return Ok(self.report(thread_id, state, next_steps, SessionStatus::Paused, version, executed));
                }
            }
        }
    }

    fn report(
        &self,
        thread_id: &str,
        state: S,
        next_steps: Vec<String>,
        status: SessionStatus,
        version: i64,
        executed: Vec<String>,
    ) -> RunReport<S> {
        RunReport {
            snapshot: SessionSnapshot {
                thread_id: thread_id.to_string(),
                state,
                next_steps,
                status,
                version,
            },
            executed,
        }
    }

    async fn record(
        &self,
        thread_id: &str,
        step: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        outcome: serde_json::Value,
    ) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let entry = ExecutionRecord {
            session_id: thread_id.to_string(),
            step_name: step.to_string(),
            start_time,
            end_time,
            outcome,
        };
        if let Err(e) = recorder.record(&entry).await {
            warn!("⚠️ Failed to log execution of '{}' for {}: {}", step, thread_id, e);
        }
    }
}

/// Builder for workflow executor
pub struct ExecutorBuilder<S: WorkflowState> {
    graph: Option<StateGraph<S>>,
    store: Option<Arc<dyn CheckpointStore>>,
    recorder: Option<Arc<dyn ExecutionRecorder>>,
    config: ExecutorConfig,
}

impl<S: WorkflowState> ExecutorBuilder<S> {
    pub fn new() -> Self {
        Self {
            graph: None,
            store: None,
            recorder: None,
            config: ExecutorConfig::default(),
        }
    }

    pub fn with_graph(mut self, graph: StateGraph<S>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_recorder(mut self, recorder: Option<Arc<dyn ExecutionRecorder>>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_steps_per_run(mut self, max: usize) -> Self {
        self.config.max_steps_per_run = max;
        self
    }

    pub fn build(self) -> Result<WorkflowExecutor<S>, WorkflowError> {
        let graph = self
            .graph
            .ok_or_else(|| WorkflowError::GraphConfig("graph not set".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| WorkflowError::GraphConfig("checkpoint store not set".to_string()))?;
        Ok(WorkflowExecutor::new(graph, store, self.recorder, self.config))
    }
}

impl<S: WorkflowState> Default for ExecutorBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
