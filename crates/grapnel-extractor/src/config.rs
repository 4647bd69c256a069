//! Configuration for the extraction pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How strictly pre-flight example validation is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Skip validation entirely
    Off,
    /// Log non-exact alignments, never abort
    Warning,
    /// Log non-exact alignments; abort on any unaligned example extraction
    Error,
}

impl Default for ValidationLevel {
    fn default() -> Self {
        ValidationLevel::Warning
    }
}

/// Configuration for the extraction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Maximum characters per chunk
    pub max_char_buffer: usize,

    /// Independent inference passes per chunk
    pub extraction_passes: u32,

    /// Concurrent inference tasks
    pub max_workers: usize,

    /// Minimum token-LCS ratio for a fuzzy alignment
    pub fuzzy_threshold: f64,

    /// Minimum window-coverage ratio for a lesser alignment
    pub lesser_threshold: f64,

    /// Whether the lesser alignment tier is attempted at all
    pub accept_lesser: bool,

    /// Fuzzy window half-range as a fraction of the query length
    pub fuzzy_slack: f64,

    /// Characters of the previous chunk injected as trailing context
    /// (0 disables)
    pub context_window_chars: usize,

    /// Pre-flight example validation strictness
    pub validation_level: ValidationLevel,

    /// Per-chunk retries after the first inference attempt
    pub max_retries: u32,

    /// Per-inference timeout (seconds)
    pub request_timeout_secs: u64,

    /// Key suffix marking attribute maps in model output
    pub attribute_suffix: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_char_buffer: 1000,
            extraction_passes: 1,
            max_workers: 10,
            fuzzy_threshold: 0.75,
            lesser_threshold: 0.5,
            accept_lesser: true,
            fuzzy_slack: 0.25,
            context_window_chars: 200,
            validation_level: ValidationLevel::Warning,
            max_retries: 2,
            request_timeout_secs: 60,
            attribute_suffix: "_attributes".to_string(),
        }
    }
}

impl ExtractConfig {
    /// Thorough preset: multiple passes and strict example validation
    pub fn thorough() -> Self {
        Self {
            extraction_passes: 3,
            validation_level: ValidationLevel::Error,
            max_retries: 3,
            ..Self::default()
        }
    }

    /// Fast preset: bigger chunks, wider fan-out, single retry
    pub fn fast() -> Self {
        Self {
            max_char_buffer: 2000,
            max_workers: 20,
            max_retries: 1,
            context_window_chars: 0,
            ..Self::default()
        }
    }

    /// Get the per-inference timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_char_buffer == 0 {
            return Err("max_char_buffer must be greater than 0".to_string());
        }
        if self.extraction_passes == 0 {
            return Err("extraction_passes must be at least 1".to_string());
        }
        if self.max_workers == 0 {
            return Err("max_workers must be at least 1".to_string());
        }
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(format!(
                "fuzzy_threshold {} outside (0, 1]",
                self.fuzzy_threshold
            ));
        }
        if !(self.lesser_threshold > 0.0 && self.lesser_threshold <= 1.0) {
            return Err(format!(
                "lesser_threshold {} outside (0, 1]",
                self.lesser_threshold
            ));
        }
        if !(0.0..1.0).contains(&self.fuzzy_slack) {
            return Err(format!("fuzzy_slack {} outside [0, 1)", self.fuzzy_slack));
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }
        if self.attribute_suffix.is_empty() {
            return Err("attribute_suffix must not be empty".to_string());
        }
        Ok(())
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to a TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
