//! Pre-flight validation of few-shot examples
//!
//! Every example extraction is aligned against its own example text before
//! any LLM call. An example the aligner cannot ground is an example the
//! model cannot learn grounding from.

use crate::aligner::Aligner;
use crate::config::{ExtractConfig, ValidationLevel};
use crate::error::ExtractError;
use crate::normalizer::RawExtraction;
use crate::tokenizer::Tokenizer;
use grapnel_domain::{AlignmentStatus, ExampleRecord};
use tracing::warn;

/// Alignment outcome for one example extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationEntry {
    /// Index of the example in the example list
    pub example_index: usize,
    /// Index of the extraction within the example
    pub extraction_index: usize,
    /// How the extraction aligned against the example text
    pub status: AlignmentStatus,
    /// Explanation for non-exact outcomes
    pub reason: Option<String>,
}

/// Per-extraction alignment report over all examples
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// One entry per example extraction, in example order
    pub entries: Vec<ValidationEntry>,
}

impl ValidationReport {
    /// Entries whose extraction could not be grounded at all
    pub fn unaligned(&self) -> impl Iterator<Item = &ValidationEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.status == AlignmentStatus::Unaligned)
    }

    /// Whether every extraction aligned exactly
    pub fn is_clean(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.status == AlignmentStatus::Exact)
    }
}

/// Validates few-shot examples with the production aligner
pub struct PromptValidator {
    tokenizer: Tokenizer,
    aligner: Aligner,
}

impl PromptValidator {
    /// Create a validator sharing the pipeline's alignment settings
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            aligner: Aligner::new(config),
        }
    }

    /// Align every example extraction against its example text
    pub fn validate(&self, examples: &[ExampleRecord]) -> ValidationReport {
        let mut entries = Vec::new();

        for (example_index, example) in examples.iter().enumerate() {
            let tokens = self.tokenizer.tokenize(&example.text);
            let raws: Vec<RawExtraction> = example
                .extractions
                .iter()
                .enumerate()
                .map(|(i, extraction)| RawExtraction {
                    class: extraction.class.clone(),
                    text: extraction.text.clone(),
                    attributes: extraction.attributes.clone(),
                    group_index: i as u32,
                })
                .collect();

            for (extraction_index, aligned) in
                self.aligner.align(raws, &tokens).into_iter().enumerate()
            {
                let reason = match aligned.alignment_status {
                    AlignmentStatus::Exact => None,
                    AlignmentStatus::Unaligned => Some(format!(
                        "no span of the example text matches '{}'",
                        aligned.text
                    )),
                    status => Some(format!("aligned only {:?} against the example text", status)),
                };
                entries.push(ValidationEntry {
                    example_index,
                    extraction_index,
                    status: aligned.alignment_status,
                    reason,
                });
            }
        }

        ValidationReport { entries }
    }

    /// Apply the configured strictness to a report
    ///
    /// `Warning` logs every non-exact entry. `Error` additionally fails on
    /// unaligned entries, before any inference has run.
    pub fn enforce(
        &self,
        report: &ValidationReport,
        level: ValidationLevel,
    ) -> Result<(), ExtractError> {
        if level == ValidationLevel::Off {
            return Ok(());
        }

        for entry in &report.entries {
            if entry.status != AlignmentStatus::Exact {
                warn!(
                    example = entry.example_index,
                    extraction = entry.extraction_index,
                    status = ?entry.status,
                    reason = entry.reason.as_deref().unwrap_or(""),
                    "example extraction did not align exactly"
                );
            }
        }

        if level == ValidationLevel::Error {
            let failures: Vec<String> = report
                .unaligned()
                .map(|entry| {
                    format!(
                        "example {} extraction {}: {}",
                        entry.example_index,
                        entry.extraction_index,
                        entry.reason.as_deref().unwrap_or("unaligned")
                    )
                })
                .collect();
            if !failures.is_empty() {
                return Err(ExtractError::AlignmentReport(failures.join("; ")));
            }
        }

        Ok(())
    }
}
