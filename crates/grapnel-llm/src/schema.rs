//! Schema advertisement from few-shot examples

use grapnel_domain::{ExampleRecord, SchemaAdapter, SchemaArtifact, SchemaError};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Derives a JSON-schema-flavored provider config from example extractions
///
/// The derived blob constrains output to an `extractions` array whose
/// elements use the class names observed in the examples. Providers with
/// native JSON modes consume it via their `format` option; the artifact
/// reports `requires_raw_output = false` because such providers emit bare
/// JSON rather than fenced text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleSchemaAdapter;

impl SimpleSchemaAdapter {
    /// Create a new adapter
    pub fn new() -> Self {
        Self
    }
}

impl SchemaAdapter for SimpleSchemaAdapter {
    fn from_examples(&self, examples: &[ExampleRecord]) -> Result<SchemaArtifact, SchemaError> {
        let mut classes: Vec<&str> = examples
            .iter()
            .flat_map(|example| example.extractions.iter())
            .map(|extraction| extraction.class.as_str())
            .collect();
        classes.sort_unstable();
        classes.dedup();

        if classes.is_empty() {
            return Err(SchemaError::new(
                "examples contain no extractions to derive a schema from",
            ));
        }

        let properties: Value = classes
            .iter()
            .map(|class| ((*class).to_string(), json!({"type": "string"})))
            .collect::<serde_json::Map<String, Value>>()
            .into();

        let schema = json!({
            "type": "object",
            "properties": {
                "extractions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": properties,
                        "additionalProperties": true,
                    }
                }
            },
            "required": ["extractions"],
        });

        let mut provider_config = BTreeMap::new();
        provider_config.insert("format".to_string(), schema);

        Ok(SchemaArtifact::new(provider_config, false))
    }
}
