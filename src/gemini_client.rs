use crate::capabilities::{CompletionError, TextCompletion};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(rename = "promptFeedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptFeedback {
    #[serde(rename = "blockReason")]
    pub block_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    pub total_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    pub fn text(&self) -> Result<String, CompletionError> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
        {
            return Err(CompletionError::Malformed(format!("prompt blocked: {}", reason)));
        }

        let candidate = self
            .candidates
            .first()
            .ok_or_else(|| CompletionError::Malformed("no candidates returned".to_string()))?;

        let text: String = candidate
            .content
            .as_ref()
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompletionError::Malformed(format!(
                "empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: &str, temperature: f32, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: model.to_string(),
            temperature,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, CompletionError> {
        let api_key = self.api_key.as_ref().ok_or(CompletionError::NotConfigured)?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        tracing::debug!("Gemini API Request contents count: {}", request.contents.len());

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed_time: Some(self.timeout),
            ..Default::default()
        };

        // Retry only transport failures and 429/5xx; everything else is permanent
        let operation = || async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .header("Content-Type", "application/json")
                .timeout(self.timeout)
                .json(request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("Gemini API connection error (retrying): {}", e);
                        backoff::Error::transient(CompletionError::Request(e))
                    } else {
                        backoff::Error::permanent(CompletionError::Request(e))
                    }
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(CompletionError::Request(e)))?;

            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!("Gemini API returned {} (retrying)", status);
                return Err(backoff::Error::transient(CompletionError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            if !status.is_success() {
                tracing::error!("Gemini API permanent error ({}): {}", status, body);
                return Err(backoff::Error::permanent(CompletionError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            serde_json::from_str::<GenerateContentResponse>(&body).map_err(|e| {
                tracing::error!("Failed to parse Gemini response: {}", e);
                backoff::Error::permanent(CompletionError::Malformed(e.to_string()))
            })
        };

        let result = retry(backoff_config, operation).await?;

        if let Some(usage) = &result.usage_metadata {
            tracing::debug!(
                "Gemini usage: {} prompt, {} completion tokens",
                usage.prompt_token_count,
                usage.candidates_token_count
            );
        }
        Ok(result)
    }
}

#[async_trait]
impl TextCompletion for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
                role: Some("user".to_string()),
            }],
            generation_config: Some(GenerationConfig {
                temperature: self.temperature,
            }),
        };

        self.generate_content(&request).await?.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_joins_parts_of_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    {"content": {"role": "model", "parts": [{"text": "Day 1: "}, {"text": "museums"}]}, "finishReason": "STOP"},
                    {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
                ],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
            }"#,
        )
        .unwrap();

        assert_eq!(response.text().unwrap(), "Day 1: museums");
    }

    #[test]
    fn test_empty_or_blocked_responses_are_malformed() {
        let empty: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(empty.text(), Err(CompletionError::Malformed(_))));

        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        match blocked.text() {
            Err(CompletionError::Malformed(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_network() {
        let client = GeminiClient::new(None, "gemini-2.5-flash", 0.7, Duration::from_secs(5));
        assert!(!client.is_configured());
        assert!(matches!(
            client.complete("hello").await,
            Err(CompletionError::NotConfigured)
        ));
    }
}
