use axum::{Extension, Router};
use guided_planner::{config::AppConfig, handlers, logging, middleware, AppState};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load environment variables from .env file
    let config = AppConfig::from_env();

    logging::init_logging("Guided planner server")?;

    tracing::info!(
        "Configuration - Database: {}, Execution log: {}, Gemini: {}",
        config.database_url,
        config.log_database_url,
        if config.gemini_api_key.is_some() { "✅" } else { "❌" }
    );

    let bind_addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState::initialize(config).await?);

    for (workflow, count) in [
        ("travel", shared_state.travel.list_sessions().await?.len()),
        ("coach", shared_state.coach.list_sessions().await?.len()),
    ] {
        tracing::info!("📂 {} stored {} session(s)", workflow, count);
    }

    let app = Router::new()
        .merge(handlers::api_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
