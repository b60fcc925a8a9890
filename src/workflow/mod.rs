// Workflow orchestration module - LangGraph-inspired state management
pub mod state;
pub mod error;
pub mod graph;
pub mod checkpoint;
pub mod executor;
pub mod router;
pub mod travel_workflow;
pub mod coach_workflow;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointer, SqliteCheckpointer};
pub use error::{StoreError, WorkflowError};
pub use executor::{ExecutorConfig, RunReport, SessionSnapshot, SessionStatus, WorkflowExecutor};
pub use state::{CoachState, TravelState, WorkflowState};
