// src/services/mod.rs
pub mod execution_log;

pub use execution_log::{ExecutionLogger, ExecutionRecorder};
