//! LLM output normalization and schema-guided parsing
//!
//! Turns one raw model completion into a list of proto-extractions. The model
//! may wrap its answer in reasoning tags or code fences, emit JSON or YAML,
//! and use either the `{class: text, class_attributes: {..}}` convention or
//! an explicit `{class, text, attributes}` record shape.

use crate::error::ExtractError;
use grapnel_domain::AttributeValue;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A parsed-but-unaligned extraction produced by the normalizer
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtraction {
    /// Record label taken from the element key or explicit `class` field
    pub class: String,
    /// Span text the model attributed to the record
    pub text: String,
    /// Attribute bag attached to the record
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Zero-based index of the owning list element
    pub group_index: u32,
}

/// Which format a fence hint asks us to try first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseOrder {
    JsonFirst,
    YamlFirst,
}

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").expect("static pattern"))
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A```([A-Za-z0-9_+.-]*)[ \t]*\r?\n(.*?)\r?\n?```\s*\z")
            .expect("static pattern")
    })
}

/// Parses raw LLM output into proto-extractions
#[derive(Debug, Clone)]
pub struct FormatNormalizer {
    wrapper_key: String,
    attribute_suffix: String,
}

impl Default for FormatNormalizer {
    fn default() -> Self {
        Self::new("extractions", "_attributes")
    }
}

impl FormatNormalizer {
    /// Create a normalizer with the given wrapper key and attribute suffix
    pub fn new(wrapper_key: impl Into<String>, attribute_suffix: impl Into<String>) -> Self {
        Self {
            wrapper_key: wrapper_key.into(),
            attribute_suffix: attribute_suffix.into(),
        }
    }

    /// Normalize one completion into proto-extractions
    pub fn normalize(&self, raw: &str) -> Result<Vec<RawExtraction>, ExtractError> {
        let stripped = think_re().replace_all(raw, "");
        let body = stripped.trim();

        let (order, body) = match fence_re().captures(body) {
            Some(caps) => {
                let lang = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
                let inner = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let order = match lang.as_deref() {
                    Some("yaml") | Some("yml") => ParseOrder::YamlFirst,
                    _ => ParseOrder::JsonFirst,
                };
                (order, inner.trim().to_string())
            }
            None => (ParseOrder::JsonFirst, body.to_string()),
        };

        let value = self.parse_body(&body, order)?;
        let elements = self.record_list(value)?;

        let mut records = Vec::new();
        for (index, element) in elements.into_iter().enumerate() {
            let object = match element {
                Value::Object(map) => map,
                other => {
                    return Err(ExtractError::FormatParse(format!(
                        "list element {} is not an object: {}",
                        index, other
                    )))
                }
            };
            records.extend(self.element_to_records(index as u32, object)?);
        }
        Ok(records)
    }

    /// Try JSON then YAML (or the reverse, per the fence hint)
    fn parse_body(&self, body: &str, order: ParseOrder) -> Result<Value, ExtractError> {
        fn as_json(body: &str) -> Result<Value, String> {
            serde_json::from_str(body).map_err(|e| e.to_string())
        }
        fn as_yaml(body: &str) -> Result<Value, String> {
            serde_yaml::from_str(body).map_err(|e| e.to_string())
        }

        let (first, second): (fn(&str) -> Result<Value, String>, fn(&str) -> _) = match order {
            ParseOrder::JsonFirst => (as_json, as_yaml),
            ParseOrder::YamlFirst => (as_yaml, as_json),
        };

        first(body).or_else(|first_err| {
            second(body).map_err(|second_err| {
                ExtractError::FormatParse(format!(
                    "body parses as neither JSON nor YAML ({}; {})",
                    first_err, second_err
                ))
            })
        })
    }

    /// Reduce the parsed value to a list of record elements
    fn record_list(&self, value: Value) -> Result<Vec<Value>, ExtractError> {
        match value {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => {
                if let Some(wrapped) = map.remove(&self.wrapper_key) {
                    match wrapped {
                        Value::Array(items) => Ok(items),
                        other => Err(ExtractError::FormatParse(format!(
                            "wrapper key '{}' must hold a list, got {}",
                            self.wrapper_key, other
                        ))),
                    }
                } else {
                    // A bare single record: wrap it
                    Ok(vec![Value::Object(map)])
                }
            }
            other => Err(ExtractError::FormatParse(format!(
                "expected an object or list of extractions, got {}",
                other
            ))),
        }
    }

    /// Expand one list element into proto-extractions
    fn element_to_records(
        &self,
        group_index: u32,
        object: serde_json::Map<String, Value>,
    ) -> Result<Vec<RawExtraction>, ExtractError> {
        if object.contains_key("class") && object.contains_key("text") {
            return self.explicit_record(group_index, object).map(|r| vec![r]);
        }

        // Convention shape: class keys carry span text, `<class>_attributes`
        // keys carry attribute maps. Key order is the model's emission order.
        let mut records: Vec<RawExtraction> = Vec::new();
        let mut orphan_attrs: Vec<(String, BTreeMap<String, AttributeValue>)> = Vec::new();

        for (key, value) in &object {
            if key.ends_with(&self.attribute_suffix) {
                if let Value::Object(map) = value {
                    let attributes = self.attribute_map(map)?;
                    let class = &key[..key.len() - self.attribute_suffix.len()];
                    if let Some(owner) = records.iter_mut().find(|r| r.class == class) {
                        owner.attributes.extend(attributes);
                    } else {
                        orphan_attrs.push((key.clone(), attributes));
                    }
                    continue;
                }
            }

            records.push(RawExtraction {
                class: key.clone(),
                text: scalar_text(key, value)?,
                attributes: BTreeMap::new(),
                group_index,
            });
        }

        // Attribute maps with no class key in the same element become
        // extractions of their own; the aligner gives them their parent's span
        for (key, attributes) in orphan_attrs {
            records.push(RawExtraction {
                class: key,
                text: String::new(),
                attributes,
                group_index,
            });
        }

        Ok(records)
    }

    /// Parse an explicit `{class, text, attributes}` element
    fn explicit_record(
        &self,
        group_index: u32,
        object: serde_json::Map<String, Value>,
    ) -> Result<RawExtraction, ExtractError> {
        let mut class = String::new();
        let mut text = String::new();
        let mut attributes = BTreeMap::new();

        for (key, value) in &object {
            match key.as_str() {
                "class" => class = scalar_text(key, value)?,
                "text" => text = scalar_text(key, value)?,
                "attributes" => match value {
                    Value::Object(map) => attributes.extend(self.attribute_map(map)?),
                    Value::Null => {}
                    other => {
                        return Err(ExtractError::FormatParse(format!(
                            "'attributes' must be an object, got {}",
                            other
                        )))
                    }
                },
                // Unknown keys are preserved as attributes
                _ => {
                    let value = AttributeValue::from_json(value).ok_or_else(|| {
                        ExtractError::FormatParse(format!(
                            "unsupported attribute shape under key '{}'",
                            key
                        ))
                    })?;
                    attributes.insert(key.clone(), value);
                }
            }
        }

        Ok(RawExtraction {
            class,
            text,
            attributes,
            group_index,
        })
    }

    fn attribute_map(
        &self,
        map: &serde_json::Map<String, Value>,
    ) -> Result<BTreeMap<String, AttributeValue>, ExtractError> {
        let mut attributes = BTreeMap::new();
        for (key, value) in map {
            let value = AttributeValue::from_json(value).ok_or_else(|| {
                ExtractError::FormatParse(format!(
                    "unsupported attribute shape under key '{}'",
                    key
                ))
            })?;
            attributes.insert(key.clone(), value);
        }
        Ok(attributes)
    }
}

/// Span text must be a scalar; lists and objects are malformed here
fn scalar_text(key: &str, value: &Value) -> Result<String, ExtractError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(ExtractError::FormatParse(format!(
            "value under key '{}' must be scalar text, got {}",
            key, other
        ))),
    }
}
