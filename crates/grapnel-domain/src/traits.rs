//! Trait definitions for external capabilities
//!
//! These traits define the boundary between the extraction pipeline and
//! infrastructure. Provider implementations live in `grapnel-llm`; the
//! pipeline in `grapnel-extractor` consumes them through these interfaces.

use crate::extraction::ExampleRecord;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors a language-model provider can surface
///
/// The pipeline's retry policy keys off the variant: `Config` aborts the run,
/// `Runtime` and `Output` are retried per chunk and then degrade that chunk.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Non-retriable provider-side configuration problem (unknown model,
    /// rejected request shape, auth)
    #[error("provider configuration rejected: {0}")]
    Config(String),

    /// Retriable transport or server failure (5xx, network, timeout)
    #[error("provider runtime failure: {0}")]
    Runtime(String),

    /// The provider answered but the response was empty or unusable
    #[error("provider returned unusable output: {0}")]
    Output(String),
}

impl InferenceError {
    /// Whether the chunk retry policy applies to this error
    pub fn is_retriable(&self) -> bool {
        !matches!(self, InferenceError::Config(_))
    }
}

/// Tuning knobs and provider passthrough for one inference call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOptions {
    /// Sampling temperature
    pub temperature: f64,

    /// Completion budget in tokens
    pub max_output_tokens: u32,

    /// Opaque provider configuration, typically produced by a
    /// [`SchemaAdapter`] and merged verbatim into the provider request
    pub provider_config: BTreeMap<String, Value>,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 1024,
            provider_config: BTreeMap::new(),
        }
    }
}

/// Trait for LLM text generation
///
/// Implementations are blocking; the pipeline issues calls from dedicated
/// blocking workers, so `infer` must be safe to call from multiple threads.
pub trait LanguageModel: Send + Sync {
    /// Generate one output string per prompt
    ///
    /// The returned vector must have the same length as `prompts`.
    fn infer(
        &self,
        prompts: &[String],
        options: &InferenceOptions,
    ) -> Result<Vec<String>, InferenceError>;

    /// Identifier of the underlying model, for logs and diagnostics
    fn model_id(&self) -> &str;
}

impl std::fmt::Debug for dyn LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModel")
            .field("model_id", &self.model_id())
            .finish()
    }
}

impl<T: LanguageModel + ?Sized> LanguageModel for Box<T> {
    fn infer(
        &self,
        prompts: &[String],
        options: &InferenceOptions,
    ) -> Result<Vec<String>, InferenceError> {
        (**self).infer(prompts, options)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

impl<T: LanguageModel + ?Sized> LanguageModel for std::sync::Arc<T> {
    fn infer(
        &self,
        prompts: &[String],
        options: &InferenceOptions,
    ) -> Result<Vec<String>, InferenceError> {
        (**self).infer(prompts, options)
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Failure to derive provider configuration from examples
#[derive(Error, Debug)]
#[error("schema derivation failed: {message}")]
pub struct SchemaError {
    /// What went wrong
    pub message: String,
}

impl SchemaError {
    /// Create a new schema error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Provider configuration derived from few-shot examples
#[derive(Debug, Clone, Default)]
pub struct SchemaArtifact {
    provider_config: BTreeMap<String, Value>,
    requires_raw_output: bool,
}

impl SchemaArtifact {
    /// Create an artifact from its parts
    pub fn new(provider_config: BTreeMap<String, Value>, requires_raw_output: bool) -> Self {
        Self {
            provider_config,
            requires_raw_output,
        }
    }

    /// Opaque configuration merged into [`InferenceOptions::provider_config`]
    pub fn to_provider_config(&self) -> BTreeMap<String, Value> {
        self.provider_config.clone()
    }

    /// Whether the provider will wrap its output in a code fence instead of
    /// emitting schema-constrained raw JSON
    pub fn requires_raw_output(&self) -> bool {
        self.requires_raw_output
    }
}

/// Trait for advertising the expected output schema to a provider
pub trait SchemaAdapter {
    /// Derive a provider configuration blob from the few-shot examples
    fn from_examples(&self, examples: &[ExampleRecord]) -> Result<SchemaArtifact, SchemaError>;
}
