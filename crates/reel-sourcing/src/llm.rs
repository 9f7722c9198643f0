//! Ollama text generation client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SourcingError, SourcingResult};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

/// Connection settings for the Ollama service.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for Ollama's `/api/generate` endpoint in JSON mode.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> SourcingResult<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            config: OllamaConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Run a non-streaming completion and return the model's JSON text.
    pub async fn generate_json(&self, prompt: &str, timeout: Duration) -> SourcingResult<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        debug!(model = %self.config.model, prompt_len = prompt.len(), "Sending Ollama request");

        let response = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                model: &self.config.model,
                prompt,
                stream: false,
                format: "json",
            })
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourcingError::llm(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SourcingError::invalid_response(format!("Ollama reply: {e}")))?;
        Ok(body.response)
    }
}
