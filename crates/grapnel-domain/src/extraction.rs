//! Extraction records and the alignment confidence model

use crate::interval::{CharInterval, TokenInterval};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence label for the grounding of an extraction
///
/// Ordered weakest first so that `Exact` compares greatest:
/// `Exact > Fuzzy > Lesser > Unaligned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentStatus {
    /// No span of the source matched the extraction text
    Unaligned,
    /// A shorter source span is explained by part of the extraction text
    Lesser,
    /// A source window matched above the fuzzy threshold
    Fuzzy,
    /// The extraction's normalized tokens matched a contiguous source run
    Exact,
}

impl AlignmentStatus {
    /// Whether this status carries source intervals
    pub fn is_aligned(&self) -> bool {
        !matches!(self, AlignmentStatus::Unaligned)
    }
}

/// A dynamically-typed attribute value attached to an extraction
///
/// Models the small set of shapes LLMs emit inside attribute maps. Anything
/// else (nested objects, heterogeneous lists) is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Explicit null
    Null,
    /// Boolean flag
    Bool(bool),
    /// Numeric value (integers widen to f64)
    Num(f64),
    /// Free-text value
    Str(String),
    /// Ordered list of strings
    StrList(Vec<String>),
}

impl AttributeValue {
    /// Convert a parsed JSON value into an attribute value
    ///
    /// Returns `None` for shapes the data model does not admit.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Some(AttributeValue::Null),
            Value::Bool(b) => Some(AttributeValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(AttributeValue::Num),
            Value::String(s) => Some(AttributeValue::Str(s.clone())),
            Value::Array(items) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect();
                strings.map(AttributeValue::StrList)
            }
            Value::Object(_) => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_string())
    }
}

/// One structured record attributed to a span of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Caller-defined record label ("medication", "symptom", ...)
    pub class: String,

    /// The span text as the model emitted it
    pub text: String,

    /// Attribute bag attached to this record
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Grounded character span, absent when unaligned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_interval: Option<CharInterval>,

    /// Grounded token span, absent when unaligned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_interval: Option<TokenInterval>,

    /// Confidence label of the grounding
    pub alignment_status: AlignmentStatus,

    /// Clusters records the model emitted together (one list element)
    pub group_index: u32,
}

impl Extraction {
    /// Create an unaligned extraction with no attributes
    pub fn new(class: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            text: text.into(),
            attributes: BTreeMap::new(),
            char_interval: None,
            token_interval: None,
            alignment_status: AlignmentStatus::Unaligned,
            group_index: 0,
        }
    }

    /// Attach an attribute, returning self for chaining
    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Whether this extraction carries source intervals
    pub fn is_aligned(&self) -> bool {
        self.alignment_status.is_aligned()
    }
}

/// A few-shot example: source text plus the extractions a model should emit
///
/// Example extractions carry no intervals; the prompt validator re-derives
/// them to check that each example is actually groundable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
    /// The example's source text
    pub text: String,

    /// Expected extractions, in emission order
    pub extractions: Vec<Extraction>,
}

impl ExampleRecord {
    /// Create a new example record
    pub fn new(text: impl Into<String>, extractions: Vec<Extraction>) -> Self {
        Self {
            text: text.into(),
            extractions,
        }
    }
}
