//! Unicode-aware tokenization over stable char and byte offsets
//!
//! Tokens carry both char offsets (the public grounding coordinate) and byte
//! offsets (so slicing the source `&str` stays O(1)). Whitespace is never
//! tokenized but counts toward offsets, which keeps the round-trip guarantee:
//! token slices plus the inter-token gaps reconstruct the document verbatim.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Classification of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Maximal run of letters and digits containing at least one letter
    Word,
    /// Maximal digit run, possibly with one internal `.` or `,`
    Number,
    /// Single non-space, non-alphanumeric character
    Punctuation,
}

/// One token of a document, with stable offsets and a normalized form
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    /// Position of this token in the document's token sequence
    pub token_index: u32,
    /// First char covered
    pub char_start: u32,
    /// One past the last char covered
    pub char_end: u32,
    /// Byte offset of `char_start` into the source text
    pub byte_start: usize,
    /// Byte offset of `char_end` into the source text
    pub byte_end: usize,
    /// Token classification
    pub kind: TokenKind,
    /// NFKD-folded, lowercased, diacritic-stripped form used for matching
    pub normalized: String,
}

impl TokenSpan {
    /// The verbatim source slice this token covers
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.byte_start..self.byte_end]
    }
}

/// Deterministic, streamable tokenizer
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// Create a new tokenizer
    pub fn new() -> Self {
        Self
    }

    /// Split `text` into token spans
    pub fn tokenize(&self, text: &str) -> Vec<TokenSpan> {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut spans = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i].1;
            if c.is_whitespace() {
                i += 1;
                continue;
            }

            let (end, kind) = if c.is_alphanumeric() {
                self.scan_alphanumeric(&chars, i)
            } else {
                (i + 1, TokenKind::Punctuation)
            };

            let byte_start = chars[i].0;
            let byte_end = if end < chars.len() {
                chars[end].0
            } else {
                text.len()
            };

            spans.push(TokenSpan {
                token_index: spans.len() as u32,
                char_start: i as u32,
                char_end: end as u32,
                byte_start,
                byte_end,
                kind,
                normalized: normalize(&text[byte_start..byte_end]),
            });
            i = end;
        }

        spans
    }

    /// Normalize a short query string into matchable terms
    ///
    /// Tokens whose normalized form is empty (bare combining marks) are
    /// dropped; they can never participate in a match.
    pub fn normalize_terms(&self, text: &str) -> Vec<String> {
        self.tokenize(text)
            .into_iter()
            .map(|span| span.normalized)
            .filter(|term| !term.is_empty())
            .collect()
    }

    /// Scan a maximal alphanumeric run starting at `start`, classifying it
    ///
    /// A pure digit run may absorb a single internal `.` or `,` when digits
    /// follow it directly. A run mixing digits and letters ("500mg") is a
    /// Word token.
    fn scan_alphanumeric(&self, chars: &[(usize, char)], start: usize) -> (usize, TokenKind) {
        let mut end = start;
        while end < chars.len() && chars[end].1.is_alphanumeric() {
            end += 1;
        }

        let all_digits = chars[start..end].iter().all(|(_, c)| c.is_ascii_digit());
        if !all_digits {
            return (end, TokenKind::Word);
        }

        // "3.5" and "1,250" stay one number token
        if end < chars.len()
            && matches!(chars[end].1, '.' | ',')
            && end + 1 < chars.len()
            && chars[end + 1].1.is_ascii_digit()
        {
            end += 1;
            while end < chars.len() && chars[end].1.is_ascii_digit() {
                end += 1;
            }
        }

        (end, TokenKind::Number)
    }
}

/// NFKD-fold, strip combining marks, lowercase
fn normalize(fragment: &str) -> String {
    fragment
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}
