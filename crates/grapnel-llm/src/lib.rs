//! Grapnel LLM Provider Layer
//!
//! Pluggable implementations of the `LanguageModel` trait from
//! `grapnel-domain`, plus schema advertisement and a model-id registry.
//!
//! # Providers
//!
//! - [`MockProvider`]: deterministic mock for testing
//! - [`OllamaProvider`]: local Ollama API integration
//!
//! # Examples
//!
//! ```
//! use grapnel_llm::MockProvider;
//! use grapnel_domain::{InferenceOptions, LanguageModel};
//!
//! let provider = MockProvider::new(r#"{"extractions":[]}"#);
//! let out = provider
//!     .infer(&["prompt".to_string()], &InferenceOptions::default())
//!     .unwrap();
//! assert_eq!(out[0], r#"{"extractions":[]}"#);
//! ```

#![warn(missing_docs)]

pub mod ollama;
pub mod registry;
pub mod schema;

use grapnel_domain::{InferenceError, InferenceOptions, LanguageModel};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub use ollama::OllamaProvider;
pub use registry::resolve;
pub use schema::SimpleSchemaAdapter;

/// Mock language model for deterministic testing
///
/// Returns pre-configured responses without any network calls. Responses are
/// resolved in priority order: injected failures, then the scripted queue,
/// then per-prompt overrides, then the default response.
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    responses: Arc<Mutex<HashMap<String, String>>>,
    queue: Arc<Mutex<VecDeque<String>>>,
    runtime_failures: Arc<Mutex<u32>>,
    config_failure: Arc<Mutex<Option<String>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockProvider {
    /// Create a provider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            responses: Arc::new(Mutex::new(HashMap::new())),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            runtime_failures: Arc::new(Mutex::new(0)),
            config_failure: Arc::new(Mutex::new(None)),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Add a specific response for a given prompt
    pub fn add_response(&self, prompt: impl Into<String>, response: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(prompt.into(), response.into());
    }

    /// Queue a response consumed before any per-prompt or default response
    pub fn push_response(&self, response: impl Into<String>) {
        self.queue.lock().unwrap().push_back(response.into());
    }

    /// Fail the next `count` calls with a retriable runtime error
    pub fn fail_times(&self, count: u32) {
        *self.runtime_failures.lock().unwrap() = count;
    }

    /// Fail every call with a non-retriable configuration error
    pub fn fail_config(&self, message: impl Into<String>) {
        *self.config_failure.lock().unwrap() = Some(message.into());
    }

    /// Number of times `infer` was called
    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    fn answer(&self, prompt: &str) -> String {
        if let Some(queued) = self.queue.lock().unwrap().pop_front() {
            return queued;
        }
        if let Some(response) = self.responses.lock().unwrap().get(prompt) {
            return response.clone();
        }
        self.default_response.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(r#"{"extractions":[]}"#)
    }
}

impl LanguageModel for MockProvider {
    fn infer(
        &self,
        prompts: &[String],
        _options: &InferenceOptions,
    ) -> Result<Vec<String>, InferenceError> {
        *self.call_count.lock().unwrap() += 1;

        if let Some(message) = self.config_failure.lock().unwrap().clone() {
            return Err(InferenceError::Config(message));
        }

        {
            let mut failures = self.runtime_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(InferenceError::Runtime(
                    "injected mock failure".to_string(),
                ));
            }
        }

        Ok(prompts.iter().map(|prompt| self.answer(prompt)).collect())
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
