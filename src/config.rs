// Application configuration, loaded from the environment (and `.env` via dotenvy)
use crate::weather_client::{DEFAULT_FORECAST_URL, DEFAULT_GEOCODING_URL};
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://planner_memory.sqlite?mode=rwc";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Missing key disables live completions; steps then fail with an external-call error
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_temperature: f32,
    pub database_url: String,
    pub log_database_url: String,
    pub bind_addr: String,
    pub weather_geocoding_url: String,
    pub weather_forecast_url: String,
    pub http_timeout: Duration,
    pub max_steps_per_run: usize,
}

impl AppConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `GEMINI_API_KEY`: text-completion key (optional)
    /// - `GEMINI_MODEL`: model name (default: gemini-2.5-flash)
    /// - `GEMINI_TEMPERATURE`: sampling temperature (default: 0.7)
    /// - `DATABASE_URL`: checkpoint database (default: sqlite://planner_memory.sqlite?mode=rwc)
    /// - `LOG_DATABASE_URL`: execution log database (default: same as DATABASE_URL)
    /// - `BIND_ADDR`: HTTP listen address (default: 0.0.0.0:3000)
    /// - `WEATHER_GEOCODING_URL` / `WEATHER_FORECAST_URL`: Open-Meteo endpoints
    /// - `HTTP_TIMEOUT_SECS`: timeout for external calls (default: 60)
    /// - `MAX_STEPS_PER_RUN`: step bound for one start/resume call (default: 50)
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let log_database_url = non_empty("LOG_DATABASE_URL").unwrap_or_else(|| database_url.clone());

        Self {
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            gemini_model: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_temperature: non_empty("GEMINI_TEMPERATURE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.7),
            database_url,
            log_database_url,
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            weather_geocoding_url: non_empty("WEATHER_GEOCODING_URL")
                .unwrap_or_else(|| DEFAULT_GEOCODING_URL.to_string()),
            weather_forecast_url: non_empty("WEATHER_FORECAST_URL")
                .unwrap_or_else(|| DEFAULT_FORECAST_URL.to_string()),
            http_timeout: Duration::from_secs(
                non_empty("HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            max_steps_per_run: non_empty("MAX_STEPS_PER_RUN")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(50),
        }
    }

    pub fn shares_log_database(&self) -> bool {
        self.database_url == self.log_database_url
    }
}
