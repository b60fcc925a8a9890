// Error taxonomy for workflow execution and checkpoint persistence
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Checkpoint for session '{thread_id}' changed concurrently")]
    VersionConflict { thread_id: String },
    #[error("Session '{thread_id}' belongs to workflow '{found}', not '{expected}'")]
    WorkflowMismatch {
        thread_id: String,
        expected: String,
        found: String,
    },
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A step ran without a field it depends on; indicates miswired graph or state
    #[error("Step '{step}' requires '{field}' but it is missing or empty")]
    Precondition { step: String, field: &'static str },

    /// The wrapped LLM or weather call failed; the last checkpoint is untouched
    #[error("External call failed in step '{step}': {message}")]
    ExternalCall { step: String, message: String },

    #[error("Checkpoint store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Session '{thread_id}' is not paused for review")]
    NotPaused { thread_id: String },

    #[error("Unknown step '{0}'")]
    UnknownStep(String),

    #[error("Run exceeded {limit} steps without pausing or completing")]
    StepLimitExceeded { limit: usize },

    #[error("Invalid workflow graph: {0}")]
    GraphConfig(String),
}

impl WorkflowError {
    pub fn precondition(step: &str, field: &'static str) -> Self {
        WorkflowError::Precondition {
            step: step.to_string(),
            field,
        }
    }

    pub fn external(step: &str, err: impl std::fmt::Display) -> Self {
        WorkflowError::ExternalCall {
            step: step.to_string(),
            message: err.to_string(),
        }
    }

    /// Re-invoking start/resume with the same arguments may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::ExternalCall { .. } | WorkflowError::Store(StoreError::VersionConflict { .. })
        )
    }
}
