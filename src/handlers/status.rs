// src/handlers/status.rs
use crate::workflow::{CoachState, TravelState, WorkflowState};
use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use std::sync::Arc;

/// GET /api/status - Liveness plus which capabilities are configured
async fn get_status(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workflows": {
            (TravelState::WORKFLOW): {
                "steps": state.travel.graph().node_ids(),
                "entry_point": state.travel.graph().entry_point(),
            },
            (CoachState::WORKFLOW): {
                "steps": state.coach.graph().node_ids(),
                "entry_point": state.coach.graph().entry_point(),
            },
        },
        "llm_configured": state.config.gemini_api_key.is_some(),
        "model": state.config.gemini_model,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(get_status))
}
