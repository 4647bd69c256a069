//! Token-aligned document chunking
//!
//! Chunks are greedy runs of tokens bounded by a char budget. The budget is
//! measured over the chunk's char span (inter-token whitespace included), a
//! token is never split, and an oversized single token becomes its own chunk.

use crate::tokenizer::{TokenKind, TokenSpan};
use grapnel_domain::{CharInterval, Document, TokenInterval};
use tracing::warn;

/// Fraction of a chunk's span, at its end, searched for a sentence boundary
const BOUNDARY_SEARCH_FRACTION: f64 = 0.15;

/// A contiguous token-bounded slice of one document
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Id of the owning document
    pub document_id: String,
    /// Position of this chunk within the document
    pub chunk_index: usize,
    /// Tokens covered, as document token indexes
    pub token_interval: TokenInterval,
    /// Chars covered, from first token start to last token end
    pub char_interval: CharInterval,
    byte_start: usize,
    byte_end: usize,
}

impl Chunk {
    /// The exact substring of the document this chunk covers
    pub fn text_view<'a>(&self, document_text: &'a str) -> &'a str {
        &document_text[self.byte_start..self.byte_end]
    }

    /// Whitespace-collapsed text suitable for prompt injection
    pub fn prompt_text(&self, document_text: &str) -> String {
        self.text_view(document_text)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Partitions a document into token-aligned chunks
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
    max_tokens: Option<usize>,
}

impl Chunker {
    /// Create a chunker with the given char budget per chunk
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            max_tokens: None,
        }
    }

    /// Additionally bound chunks by token count
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens.max(1));
        self
    }

    /// Chunk a document's token sequence
    ///
    /// Chunks never overlap and together cover every token. A document with
    /// no tokens yields no chunks.
    pub fn chunk(&self, document: &Document, tokens: &[TokenSpan]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let base = tokens[start].char_start;

            // A single token over budget forms its own chunk
            if (tokens[start].char_end - base) as usize > self.max_chars {
                warn!(
                    document_id = %document.id,
                    token_index = tokens[start].token_index,
                    len = tokens[start].char_end - base,
                    "token exceeds max_char_buffer, emitting it as its own chunk"
                );
                let chunk_index = chunks.len();
                chunks.push(self.build(document, tokens, chunk_index, start, start + 1));
                start += 1;
                continue;
            }

            let token_budget = self.max_tokens.unwrap_or(usize::MAX);
            let mut end = start + 1;
            while end < tokens.len()
                && end - start < token_budget
                && (tokens[end].char_end - base) as usize <= self.max_chars
            {
                end += 1;
            }

            if end < tokens.len() {
                end = self.prefer_sentence_boundary(document, tokens, start, end);
            }

            let chunk_index = chunks.len();
            chunks.push(self.build(document, tokens, chunk_index, start, end));
            start = end;
        }

        chunks
    }

    /// Pull the cut back to a sentence boundary inside the last 15% of the
    /// chunk's span, when one exists
    fn prefer_sentence_boundary(
        &self,
        document: &Document,
        tokens: &[TokenSpan],
        start: usize,
        end: usize,
    ) -> usize {
        let base = tokens[start].char_start;
        let span = tokens[end - 1].char_end - base;
        let floor = base + ((span as f64) * (1.0 - BOUNDARY_SEARCH_FRACTION)) as u32;

        // Walk back over candidate boundaries; a boundary after the final
        // token of the window is no cut at all
        for i in (start..end - 1).rev() {
            let token = &tokens[i];
            if token.char_end < floor {
                break;
            }
            if is_sentence_terminal(token, tokens.get(i + 1), &document.text) {
                return i + 1;
            }
        }
        end
    }

    fn build(
        &self,
        document: &Document,
        tokens: &[TokenSpan],
        chunk_index: usize,
        start: usize,
        end: usize,
    ) -> Chunk {
        let first = &tokens[start];
        let last = &tokens[end - 1];
        Chunk {
            document_id: document.id.clone(),
            chunk_index,
            token_interval: TokenInterval::new(first.token_index, last.token_index + 1),
            char_interval: CharInterval::new(first.char_start, last.char_end),
            byte_start: first.byte_start,
            byte_end: last.byte_end,
        }
    }
}

/// Terminal punctuation followed by whitespace (or end of text)
fn is_sentence_terminal(token: &TokenSpan, next: Option<&TokenSpan>, text: &str) -> bool {
    if token.kind != TokenKind::Punctuation {
        return false;
    }
    if !matches!(token.slice(text), "." | "!" | "?") {
        return false;
    }
    match next {
        // Whitespace between this token and the next
        Some(following) => following.char_start > token.char_end,
        None => true,
    }
}
