// src/weather_client.rs
use crate::capabilities::{WeatherError, WeatherLookup, WeatherReport};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    geocoding_url: String,
    forecast_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GeocodingResponse {
    #[serde(default)]
    pub results: Vec<GeocodingResult>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeocodingResult {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ForecastResponse {
    pub daily: DailyForecast,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DailyForecast {
    #[serde(default)]
    pub precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
}

impl ForecastResponse {
    /// Today's values; missing readings are a malformed response
    pub fn first_day(&self) -> Result<WeatherReport, WeatherError> {
        let precipitation_mm = self
            .daily
            .precipitation_sum
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| WeatherError::Malformed("missing precipitation_sum".to_string()))?;
        let max_temp_c = self
            .daily
            .temperature_2m_max
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| WeatherError::Malformed("missing temperature_2m_max".to_string()))?;

        Ok(WeatherReport {
            precipitation_mm,
            max_temp_c,
        })
    }
}

impl OpenMeteoClient {
    pub fn new(geocoding_url: &str, forecast_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            geocoding_url: geocoding_url.to_string(),
            forecast_url: forecast_url.to_string(),
            timeout,
        }
    }

    pub async fn geocode(&self, city: &str) -> Result<Option<GeocodingResult>, WeatherError> {
        let response = self
            .client
            .get(&self.geocoding_url)
            .query(&[("name", city), ("count", "1"), ("language", "en"), ("format", "json")])
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            error!("Geocoding API error: {}", body);
            return Err(WeatherError::Api { status, body });
        }

        let geocoding = response.json::<GeocodingResponse>().await?;
        Ok(geocoding.results.into_iter().next())
    }

    pub async fn forecast(&self, latitude: f64, longitude: f64) -> Result<WeatherReport, WeatherError> {
        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("daily", "precipitation_sum,temperature_2m_max".to_string()),
                ("timezone", "auto".to_string()),
                ("forecast_days", "1".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            error!("Forecast API error: {}", body);
            return Err(WeatherError::Api { status, body });
        }

        response.json::<ForecastResponse>().await?.first_day()
    }
}

#[async_trait]
impl WeatherLookup for OpenMeteoClient {
    async fn lookup(&self, city: &str) -> Result<Option<WeatherReport>, WeatherError> {
        let Some(place) = self.geocode(city).await? else {
            info!("🌍 No geocoding match for '{}'", city);
            return Ok(None);
        };

        let report = self.forecast(place.latitude, place.longitude).await?;
        info!(
            "🌦️ Forecast for {} ({:.2}, {:.2}): {:.1}mm, max {:.1}°C",
            place.name, place.latitude, place.longitude, report.precipitation_mm, report.max_temp_c
        );
        Ok(Some(report))
    }
}
