// Opaque external capabilities the workflow steps call into
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Text completion is not configured (set GEMINI_API_KEY)")]
    NotConfigured,
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Malformed completion response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Weather API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Malformed weather response: {0}")]
    Malformed(String),
}

/// Prompt in, text out
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// One day's forecast for a city
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub precipitation_mm: f64,
    pub max_temp_c: f64,
}

#[async_trait]
pub trait WeatherLookup: Send + Sync {
    /// `Ok(None)` when the city cannot be found
    async fn lookup(&self, city: &str) -> Result<Option<WeatherReport>, WeatherError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays queued responses and records every prompt it was given
    #[derive(Default)]
    pub struct ScriptedCompletion {
        responses: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_ok(&self, text: &str) -> &Self {
            self.responses.lock().unwrap().push_back(Ok(text.to_string()));
            self
        }

        pub fn push_err(&self, message: &str) -> &Self {
            self.responses.lock().unwrap().push_back(Err(message.to_string()));
            self
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextCompletion for ScriptedCompletion {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            let index = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(CompletionError::Malformed(message)),
                None => Ok(format!("response #{}", index)),
            }
        }
    }

    /// Fixed forecasts keyed by city; unknown cities are not found
    #[derive(Default)]
    pub struct FixedWeather {
        reports: HashMap<String, WeatherReport>,
        failures_left: Mutex<usize>,
    }

    impl FixedWeather {
        pub fn with(mut self, city: &str, precipitation_mm: f64, max_temp_c: f64) -> Self {
            self.reports.insert(
                city.to_string(),
                WeatherReport {
                    precipitation_mm,
                    max_temp_c,
                },
            );
            self
        }

        /// Fail the next `count` lookups before answering normally
        pub fn with_failures(self, count: usize) -> Self {
            *self.failures_left.lock().unwrap() = count;
            self
        }

        pub fn failing() -> Self {
            Self::default().with_failures(usize::MAX)
        }
    }

    #[async_trait]
    impl WeatherLookup for FixedWeather {
        async fn lookup(&self, city: &str) -> Result<Option<WeatherReport>, WeatherError> {
            {
                let mut failures_left = self.failures_left.lock().unwrap();
                if *failures_left > 0 {
                    *failures_left -= 1;
                    return Err(WeatherError::Malformed("forecast unavailable".to_string()));
                }
            }
            Ok(self.reports.get(city).copied())
        }
    }
}
