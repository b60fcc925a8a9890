// src/handlers/mod.rs
pub mod sessions;
pub mod status;

use crate::workflow::{CoachState, TravelState, WorkflowState};
use axum::Router;

/// All API routes; each workflow is mounted under its own prefix
pub fn api_routes() -> Router {
    Router::new()
        .merge(status::status_routes())
        .nest(
            &format!("/api/{}", TravelState::WORKFLOW),
            sessions::session_routes::<TravelState>(),
        )
        .nest(
            &format!("/api/{}", CoachState::WORKFLOW),
            sessions::session_routes::<CoachState>(),
        )
}
