//! Ollama provider implementation
//!
//! Talks to a local Ollama instance over its blocking HTTP API. The pipeline
//! issues `infer` from dedicated blocking workers, so a blocking client is
//! the right shape here; retry and backoff live in the pipeline, not the
//! provider.

use grapnel_domain::{InferenceError, InferenceOptions, LanguageModel};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default transport timeout
///
/// Slightly above the pipeline's own per-request timeout so the pipeline's
/// deadline fires first.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Ollama API provider for local model inference
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: Map<String, Value>,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaProvider {
    /// Create a provider for `model` at `endpoint`
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a provider with an explicit transport timeout
    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            client,
        }
    }

    /// Create a provider against the default local endpoint
    pub fn default_endpoint(model: impl Into<String>) -> Self {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    fn generate(&self, prompt: &str, options: &InferenceOptions) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.endpoint);

        let mut request_options = Map::new();
        request_options.insert("temperature".to_string(), options.temperature.into());
        request_options.insert("num_predict".to_string(), options.max_output_tokens.into());
        for (key, value) in &options.provider_config {
            request_options.insert(key.clone(), value.clone());
        }

        let body = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: request_options,
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "calling ollama");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| InferenceError::Runtime(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(InferenceError::Config(format!(
                "model '{}' not available",
                self.model
            )));
        }
        if status.is_client_error() {
            let detail = response.text().unwrap_or_else(|_| "no body".to_string());
            return Err(InferenceError::Config(format!("HTTP {}: {}", status, detail)));
        }
        if !status.is_success() {
            let detail = response.text().unwrap_or_else(|_| "no body".to_string());
            return Err(InferenceError::Runtime(format!(
                "HTTP {}: {}",
                status, detail
            )));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| InferenceError::Output(format!("unparseable response body: {}", e)))?;

        if parsed.response.is_empty() {
            return Err(InferenceError::Output("empty completion".to_string()));
        }
        Ok(parsed.response)
    }
}

impl LanguageModel for OllamaProvider {
    fn infer(
        &self,
        prompts: &[String],
        options: &InferenceOptions,
    ) -> Result<Vec<String>, InferenceError> {
        prompts
            .iter()
            .map(|prompt| self.generate(prompt, options))
            .collect()
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
