//! Grapnel Extractor
//!
//! Extracts structured records from unstructured text with an LLM and
//! grounds every record to an exact span of the source.
//!
//! # Architecture
//!
//! ```text
//! Document → Tokenizer → Chunker → (per pass) Annotator {
//!     PromptBuilder → LanguageModel → FormatNormalizer → Aligner
//! } → PassMerger → AnnotatedDocument
//! ```
//!
//! # Key Features
//!
//! - **Source grounding**: every extraction maps to a char interval with a
//!   labeled confidence (exact / fuzzy / lesser / unaligned)
//! - **Chunked concurrency**: bounded fan-out over chunks, sequential passes,
//!   deterministic output ordering
//! - **Failure containment**: per-chunk retries with jittered backoff; a
//!   failing chunk degrades to a warning instead of aborting the run
//! - **Pre-flight validation**: few-shot examples are aligned against their
//!   own text before the first LLM call
//!
//! # Example Usage
//!
//! ```no_run
//! use grapnel_domain::{Document, ExampleRecord, Extraction};
//! use grapnel_extractor::{ExtractConfig, Pipeline};
//! use grapnel_llm::MockProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let examples = vec![ExampleRecord::new(
//!     "Patient takes aspirin 500mg daily.",
//!     vec![Extraction::new("medication", "aspirin 500mg")],
//! )];
//!
//! let pipeline = Pipeline::new(
//!     MockProvider::default(),
//!     "Extract medications with their attributes.",
//!     examples,
//!     ExtractConfig::default(),
//! )?;
//!
//! let documents = vec![Document::new("He was given ibuprofen twice.")];
//! let annotated = pipeline.run(&documents).await?;
//! println!("{} extractions", annotated[0].extractions.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod aligner;
mod annotator;
mod chunker;
mod config;
mod error;
mod merger;
mod normalizer;
mod pipeline;
mod prompt;
mod tokenizer;
mod validator;

#[cfg(test)]
mod tests;

pub use aligner::Aligner;
pub use annotator::Annotator;
pub use chunker::{Chunk, Chunker};
pub use config::{ExtractConfig, ValidationLevel};
pub use error::ExtractError;
pub use merger::PassMerger;
pub use normalizer::{FormatNormalizer, RawExtraction};
pub use pipeline::Pipeline;
pub use prompt::{PromptBuilder, PARSE_RETRY_REMINDER};
pub use tokenizer::{TokenKind, TokenSpan, Tokenizer};
pub use validator::{PromptValidator, ValidationEntry, ValidationReport};
