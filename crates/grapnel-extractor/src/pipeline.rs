//! Top-level extraction pipeline
//!
//! Thin coordinator: validates input contracts, runs pre-flight example
//! validation, then hands documents to the annotator. No extraction logic
//! lives here.

use crate::annotator::Annotator;
use crate::config::{ExtractConfig, ValidationLevel};
use crate::error::ExtractError;
use crate::prompt::PromptBuilder;
use crate::validator::PromptValidator;
use grapnel_domain::{
    AnnotatedDocument, Document, ExampleRecord, InferenceOptions, LanguageModel, SchemaAdapter,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Wires validator, chunker, annotator, and merger into one entry point
pub struct Pipeline<L: LanguageModel + 'static> {
    model: Arc<L>,
    task_description: String,
    examples: Vec<ExampleRecord>,
    config: ExtractConfig,
    options: InferenceOptions,
    suppress_format_note: bool,
}

impl<L: LanguageModel + 'static> Pipeline<L> {
    /// Create a pipeline, rejecting invalid configuration and examples
    pub fn new(
        model: L,
        task_description: impl Into<String>,
        examples: Vec<ExampleRecord>,
        config: ExtractConfig,
    ) -> Result<Self, ExtractError> {
        config.validate().map_err(ExtractError::InvalidInput)?;

        for (index, example) in examples.iter().enumerate() {
            if example.text.trim().is_empty() {
                return Err(ExtractError::InvalidInput(format!(
                    "example {} has empty text",
                    index
                )));
            }
            for (extraction_index, extraction) in example.extractions.iter().enumerate() {
                if extraction.class.is_empty() {
                    return Err(ExtractError::InvalidInput(format!(
                        "example {} extraction {} has an empty class",
                        index, extraction_index
                    )));
                }
            }
        }

        Ok(Self {
            model: Arc::new(model),
            task_description: task_description.into(),
            examples,
            config,
            options: InferenceOptions::default(),
            suppress_format_note: false,
        })
    }

    /// Override the inference options
    pub fn with_options(mut self, options: InferenceOptions) -> Self {
        self.options = options;
        self
    }

    /// Derive provider configuration from the examples via a schema adapter
    ///
    /// The artifact's config merges into the inference options; when the
    /// provider enforces the schema natively, the prompt's format note is
    /// suppressed.
    pub fn with_schema(mut self, adapter: &dyn SchemaAdapter) -> Result<Self, ExtractError> {
        let artifact = adapter.from_examples(&self.examples)?;
        self.options
            .provider_config
            .extend(artifact.to_provider_config());
        self.suppress_format_note = !artifact.requires_raw_output();
        Ok(self)
    }

    /// Extract and ground records from a batch of documents
    ///
    /// Pre-flight example validation runs before any inference; at the
    /// `Error` level an unalignable example aborts the run here.
    pub async fn run(&self, documents: &[Document]) -> Result<Vec<AnnotatedDocument>, ExtractError> {
        let mut seen_ids = HashSet::new();
        for document in documents {
            if document.text.trim().is_empty() {
                return Err(ExtractError::InvalidInput(format!(
                    "document '{}' has empty text",
                    document.id
                )));
            }
            if !seen_ids.insert(document.id.as_str()) {
                return Err(ExtractError::InvalidInput(format!(
                    "duplicate document id '{}' in batch",
                    document.id
                )));
            }
        }

        if self.config.validation_level != ValidationLevel::Off {
            let validator = PromptValidator::new(&self.config);
            let report = validator.validate(&self.examples);
            validator.enforce(&report, self.config.validation_level)?;
        }

        info!(
            documents = documents.len(),
            examples = self.examples.len(),
            model = self.model.model_id(),
            "starting extraction run"
        );

        let mut prompt_builder =
            PromptBuilder::new(self.task_description.clone(), self.examples.clone())
                .with_attribute_suffix(self.config.attribute_suffix.clone());
        if self.suppress_format_note {
            prompt_builder = prompt_builder.without_format_note();
        }

        let annotator = Annotator::new(
            Arc::clone(&self.model),
            prompt_builder,
            self.config.clone(),
            self.options.clone(),
        );
        annotator.annotate_batch(documents).await
    }
}
