//! Error types for the extraction pipeline

use grapnel_domain::{InferenceError, SchemaError};
use thiserror::Error;

/// Errors that can abort or degrade an extraction run
///
/// Fatal variants (`InvalidInput`, `Schema`, `InferenceConfig`,
/// `AlignmentReport`) abort the whole pipeline. `InferenceRuntime` and
/// `FormatParse` abort only when surfaced directly; inside the annotator they
/// degrade the affected chunk to an empty extraction list plus a warning.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Empty document, malformed example, or rejected configuration
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Schema adapter failed to derive provider configuration
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Provider rejected the request for non-retriable reasons
    #[error("inference configuration rejected: {0}")]
    InferenceConfig(#[source] InferenceError),

    /// Provider kept failing after the per-chunk retry budget
    #[error("inference failed after {attempts} attempts: {original}")]
    InferenceRuntime {
        /// Number of attempts made, including the first
        attempts: u32,
        /// The last provider error observed
        #[source]
        original: InferenceError,
    },

    /// Model output stayed unparseable after normalization
    #[error("unparseable model output: {0}")]
    FormatParse(String),

    /// Prompt validation rejected a few-shot example
    #[error("example validation failed: {0}")]
    AlignmentReport(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_inference_errors_carry_source() {
        let err = ExtractError::InferenceConfig(InferenceError::Config("unknown model".into()));
        assert!(err.source().is_some());

        let err = ExtractError::InferenceRuntime {
            attempts: 3,
            original: InferenceError::Runtime("503".into()),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn test_schema_error_is_transparent() {
        let err: ExtractError = SchemaError::new("no examples").into();
        assert_eq!(err.to_string(), "schema derivation failed: no examples");
    }
}
