//! Prompt assembly for chunked extraction
//!
//! Examples are serialized in exactly the shape the normalizer accepts, so
//! the model is trained by demonstration to emit parseable output.

use grapnel_domain::{AttributeValue, ExampleRecord, Extraction};
use serde_json::{Map, Value};

const EXAMPLES_HEADER: &str = "Examples";
const INPUT_PREFIX: &str = "Input: ";
const OUTPUT_PREFIX: &str = "Output: ";
const CONTEXT_PREFIX: &str = "Context from the preceding text (reference only, do not extract from it): ";

const FORMAT_NOTE: &str = "Return the extractions as a JSON object with an \"extractions\" array. \
Each array element maps a class name to the exact span text, with optional \
\"<class>_attributes\" objects. Return only JSON, no commentary.";

/// The reminder appended when a completion could not be parsed
pub const PARSE_RETRY_REMINDER: &str =
    "Your previous reply could not be parsed. Return only valid JSON in the requested format.";

/// Assembles prompts from task description, few-shot examples, and chunk text
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    task_description: String,
    examples: Vec<ExampleRecord>,
    include_format_note: bool,
    wrapper_key: String,
    attribute_suffix: String,
}

impl PromptBuilder {
    /// Create a builder with the default output-format note enabled
    pub fn new(task_description: impl Into<String>, examples: Vec<ExampleRecord>) -> Self {
        Self {
            task_description: task_description.into(),
            examples,
            include_format_note: true,
            wrapper_key: "extractions".to_string(),
            attribute_suffix: "_attributes".to_string(),
        }
    }

    /// Suppress the output-format note (the provider enforces schema natively)
    pub fn without_format_note(mut self) -> Self {
        self.include_format_note = false;
        self
    }

    /// Override the attribute suffix used when rendering examples
    pub fn with_attribute_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.attribute_suffix = suffix.into();
        self
    }

    /// The few-shot examples this builder renders
    pub fn examples(&self) -> &[ExampleRecord] {
        &self.examples
    }

    /// Build the prompt for one chunk
    ///
    /// `trailing_context` is the tail of the previous chunk of the same
    /// document, when the context window is enabled.
    pub fn build(&self, chunk_text: &str, trailing_context: Option<&str>) -> String {
        let mut prompt = String::new();

        prompt.push_str(&self.task_description);
        prompt.push_str("\n\n");

        if self.include_format_note {
            prompt.push_str(FORMAT_NOTE);
            prompt.push_str("\n\n");
        }

        if !self.examples.is_empty() {
            prompt.push_str(EXAMPLES_HEADER);
            prompt.push('\n');
            for example in &self.examples {
                prompt.push_str(INPUT_PREFIX);
                prompt.push_str(&example.text);
                prompt.push('\n');
                prompt.push_str(OUTPUT_PREFIX);
                prompt.push_str(&self.render_extractions(&example.extractions));
                prompt.push_str("\n\n");
            }
        }

        if let Some(context) = trailing_context {
            prompt.push_str(CONTEXT_PREFIX);
            prompt.push_str(context);
            prompt.push('\n');
        }

        prompt.push_str(INPUT_PREFIX);
        prompt.push_str(chunk_text);
        prompt.push('\n');
        prompt.push_str(OUTPUT_PREFIX.trim_end());

        prompt
    }

    /// Serialize extractions into the convention shape the parser accepts
    fn render_extractions(&self, extractions: &[Extraction]) -> String {
        let mut elements = Vec::new();
        for extraction in extractions {
            let mut element = Map::new();
            element.insert(
                extraction.class.clone(),
                Value::String(extraction.text.clone()),
            );
            if !extraction.attributes.is_empty() {
                let attrs: Map<String, Value> = extraction
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                    .collect();
                element.insert(
                    format!("{}{}", extraction.class, self.attribute_suffix),
                    Value::Object(attrs),
                );
            }
            elements.push(Value::Object(element));
        }

        let mut wrapper = Map::new();
        wrapper.insert(self.wrapper_key.clone(), Value::Array(elements));
        Value::Object(wrapper).to_string()
    }
}

fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Num(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::Str(s) => Value::String(s.clone()),
        AttributeValue::StrList(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
    }
}
