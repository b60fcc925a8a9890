// src/handlers/sessions.rs
//! Session endpoints - start, resume, inspect, list and delete workflow sessions

use crate::workflow::{
    CoachState, RunReport, SessionSnapshot, SessionStatus, StoreError, TravelState, WorkflowError,
    WorkflowExecutor, WorkflowState,
};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Picks the executor serving a workflow's state type
pub trait HostedWorkflow: WorkflowState {
    fn executor(app: &AppState) -> &WorkflowExecutor<Self>;
}

impl HostedWorkflow for TravelState {
    fn executor(app: &AppState) -> &WorkflowExecutor<Self> {
        &app.travel
    }
}

impl HostedWorkflow for CoachState {
    fn executor(app: &AppState) -> &WorkflowExecutor<Self> {
        &app.coach
    }
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub input: String,
}

#[derive(Deserialize)]
pub struct ResumeRequest {
    #[serde(default)]
    pub feedback: String,
}

pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::ExternalCall { .. } => StatusCode::BAD_GATEWAY,
        WorkflowError::NotPaused { .. }
        | WorkflowError::Store(StoreError::VersionConflict { .. }) => StatusCode::CONFLICT,
        WorkflowError::Precondition { .. }
        | WorkflowError::Store(_)
        | WorkflowError::UnknownStep(_)
        | WorkflowError::StepLimitExceeded { .. }
        | WorkflowError::GraphConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: WorkflowError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("❌ Workflow request failed: {}", err);
    } else {
        tracing::warn!("Workflow request rejected: {}", err);
    }

    let hint = match err {
        WorkflowError::ExternalCall { .. } => Some("external service failed; retry the same request"),
        WorkflowError::Store(StoreError::VersionConflict { .. }) => {
            Some("session was advanced by another client; inspect it and retry")
        }
        _ => None,
    };
    let body = serde_json::json!({
        "error": err.to_string(),
        "retryable": err.is_retryable(),
        "hint": hint,
    });
    (status, Json(body)).into_response()
}

fn not_found(thread_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": format!("Session {} not found", thread_id) })),
    )
        .into_response()
}

fn snapshot_json<S: WorkflowState>(snapshot: &SessionSnapshot<S>) -> serde_json::Value {
    serde_json::json!({
        "thread_id": snapshot.thread_id,
        "workflow": S::WORKFLOW,
        "status": snapshot.status,
        "is_paused": snapshot.is_paused(),
        "pending_step": snapshot.pending_step(),
        "revision_count": snapshot.state.revision_count(),
        "version": snapshot.version,
        "state": snapshot.state,
    })
}

fn run_response<S: WorkflowState>(report: RunReport<S>) -> Response {
    let mut body = snapshot_json(&report.snapshot);
    body["executed"] = serde_json::json!(report.executed);
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /api/{workflow}/sessions - List session ids, newest first
async fn list_sessions<S: HostedWorkflow>(Extension(state): Extension<Arc<AppState>>) -> Response {
    match S::executor(&state).list_sessions().await {
        Ok(sessions) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "workflow": S::WORKFLOW,
                "count": sessions.len(),
                "sessions": sessions,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/{workflow}/sessions - Start a session under a fresh id
async fn create_session<S: HostedWorkflow>(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Response {
    let thread_id = Uuid::new_v4().to_string();
    tracing::info!("🆕 Creating {} session {}", S::WORKFLOW, thread_id);
    match S::executor(&state)
        .start(&thread_id, S::input_update(request.input))
        .await
    {
        Ok(report) => run_response(report),
        Err(e) => error_response(e),
    }
}

/// POST /api/{workflow}/sessions/:thread_id/start - Start (or restart) a session
async fn start_session<S: HostedWorkflow>(
    Path(thread_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Response {
    match S::executor(&state)
        .start(&thread_id, S::input_update(request.input))
        .await
    {
        Ok(report) => run_response(report),
        Err(e) => error_response(e),
    }
}

/// POST /api/{workflow}/sessions/:thread_id/resume - Submit review feedback
async fn resume_session<S: HostedWorkflow>(
    Path(thread_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ResumeRequest>,
) -> Response {
    let executor = S::executor(&state);
    match executor.inspect(&thread_id).await {
        Ok(snapshot) if snapshot.status == SessionStatus::New => return not_found(&thread_id),
        Ok(_) => {}
        Err(e) => return error_response(e),
    }

    match executor
        .resume(&thread_id, S::feedback_update(request.feedback))
        .await
    {
        Ok(report) => run_response(report),
        Err(e) => error_response(e),
    }
}

/// GET /api/{workflow}/sessions/:thread_id - Inspect a session
async fn get_session<S: HostedWorkflow>(
    Path(thread_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match S::executor(&state).inspect(&thread_id).await {
        Ok(snapshot) if snapshot.status == SessionStatus::New => not_found(&thread_id),
        Ok(snapshot) => (StatusCode::OK, Json(snapshot_json(&snapshot))).into_response(),
        Err(e) => error_response(e),
    }
}

/// DELETE /api/{workflow}/sessions/:thread_id - Drop a session's checkpoint
async fn delete_session<S: HostedWorkflow>(
    Path(thread_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match S::executor(&state).delete_session(&thread_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(&thread_id),
        Err(e) => error_response(e),
    }
}

/// GET /api/{workflow}/sessions/:thread_id/logs - Execution log rows
async fn get_session_logs(
    Path(thread_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.execution_logger.get_logs_for_session(&thread_id).await {
        Ok(rows) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "session_id": thread_id,
                "count": rows.len(),
                "logs": rows,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to read execution logs for {}: {}", thread_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read execution logs").into_response()
        }
    }
}

/// Routes for one workflow, mounted under `/api/{workflow}`
pub fn session_routes<S: HostedWorkflow>() -> Router {
    Router::new()
        .route("/sessions", get(list_sessions::<S>).post(create_session::<S>))
        .route("/sessions/:thread_id", get(get_session::<S>).delete(delete_session::<S>))
        .route("/sessions/:thread_id/start", post(start_session::<S>))
        .route("/sessions/:thread_id/resume", post(resume_session::<S>))
        .route("/sessions/:thread_id/logs", get(get_session_logs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            status_for(&WorkflowError::external("planner", "timeout")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&WorkflowError::NotPaused {
                thread_id: "t1".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&WorkflowError::precondition("planner", "location")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&WorkflowError::Store(StoreError::VersionConflict {
                thread_id: "t1".to_string()
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&WorkflowError::Store(StoreError::WorkflowMismatch {
                thread_id: "t1".to_string(),
                expected: "travel".to_string(),
                found: "coach".to_string(),
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
