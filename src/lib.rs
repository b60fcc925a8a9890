// lib.rs - Main library file that exports all modules
pub mod capabilities;
pub mod config;
pub mod db;
pub mod gemini_client;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod services;
pub mod weather_client;
pub mod workflow;

use capabilities::{TextCompletion, WeatherLookup};
use config::AppConfig;
use gemini_client::GeminiClient;
use services::execution_log::{ExecutionLogger, ExecutionRecorder};
use std::sync::Arc;
use thiserror::Error;
use weather_client::OpenMeteoClient;
use workflow::checkpoint::{CheckpointStore, SqliteCheckpointer};
use workflow::coach_workflow::create_coach_executor;
use workflow::travel_workflow::create_travel_executor;
use workflow::{CoachState, ExecutorConfig, TravelState, WorkflowError, WorkflowExecutor};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// AppState holds both workflow executors, the execution log and the loaded config
pub struct AppState {
    pub travel: WorkflowExecutor<TravelState>,
    pub coach: WorkflowExecutor<CoachState>,
    pub execution_logger: ExecutionLogger,
    pub config: AppConfig,
}

impl AppState {
    /// Connect databases, create tables and wire the live capabilities
    pub async fn initialize(config: AppConfig) -> Result<Self, StartupError> {
        let pool = db::create_pool(&config.database_url).await?;
        let log_pool = if config.shares_log_database() {
            pool.clone()
        } else {
            db::create_pool(&config.log_database_url).await?
        };

        let checkpointer = SqliteCheckpointer::new(pool);
        checkpointer.setup().await?;
        tracing::info!("✅ Workflow checkpointing enabled (SQLite)");

        let execution_logger = ExecutionLogger::new(log_pool);
        execution_logger.setup().await?;

        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not found. Planning steps will fail until it is set.");
        }
        let llm: Arc<dyn TextCompletion> = Arc::new(GeminiClient::new(
            config.gemini_api_key.clone(),
            &config.gemini_model,
            config.gemini_temperature,
            config.http_timeout,
        ));
        let weather: Arc<dyn WeatherLookup> = Arc::new(OpenMeteoClient::new(
            &config.weather_geocoding_url,
            &config.weather_forecast_url,
            config.http_timeout,
        ));

        Self::assemble(config, llm, weather, Arc::new(checkpointer), execution_logger)
    }

    /// Build both executors over the given capabilities and stores
    pub fn assemble(
        config: AppConfig,
        llm: Arc<dyn TextCompletion>,
        weather: Arc<dyn WeatherLookup>,
        store: Arc<dyn CheckpointStore>,
        execution_logger: ExecutionLogger,
    ) -> Result<Self, StartupError> {
        let executor_config = ExecutorConfig {
            max_steps_per_run: config.max_steps_per_run,
        };
        let recorder: Arc<dyn ExecutionRecorder> = Arc::new(execution_logger.clone());

        let travel = create_travel_executor(
            llm.clone(),
            weather,
            store.clone(),
            Some(recorder.clone()),
            executor_config.clone(),
        )?;
        let coach = create_coach_executor(llm, store, Some(recorder), executor_config)?;

        Ok(Self {
            travel,
            coach,
            execution_logger,
            config,
        })
    }
}
