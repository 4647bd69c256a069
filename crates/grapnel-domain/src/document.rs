//! Documents and annotated output

use crate::extraction::Extraction;
use serde::{Deserialize, Serialize};

/// An immutable piece of source text
///
/// The id is unique within one extraction batch and links chunks and
/// annotations back to their source without back-references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Batch-unique identifier
    pub id: String,

    /// The source text; never mutated by the pipeline
    pub text: String,
}

impl Document {
    /// Create a document with a generated `doc_<uuid>` id
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: format!("doc_{}", uuid::Uuid::new_v4().simple()),
            text: text.into(),
        }
    }

    /// Create a document with a caller-owned id
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A structured note attached when a chunk degraded instead of aborting
///
/// Produced when a chunk exhausted its inference retries or its output stayed
/// unparseable; the chunk then contributes no extractions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkWarning {
    /// Zero-based extraction pass the failure occurred in
    pub pass: u32,
    /// Index of the chunk within the document
    pub chunk_index: usize,
    /// Human-readable failure description
    pub message: String,
}

/// A document plus its ordered, grounded extractions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDocument {
    /// Id of the source document
    pub document_id: String,

    /// The source text the intervals point into
    pub text: String,

    /// Extractions ordered by `(char_start, char_end)`, ties and unaligned
    /// records in emission order
    pub extractions: Vec<Extraction>,

    /// Degradation notes for chunks that produced no output
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ChunkWarning>,
}

impl AnnotatedDocument {
    /// Serialize to one JSON Lines record
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Serialize a batch of annotated documents to JSON Lines
pub fn write_jsonl(documents: &[AnnotatedDocument]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for document in documents {
        out.push_str(&document.to_json_line()?);
        out.push('\n');
    }
    Ok(out)
}
