//! Half-open interval types over character and token coordinates

use serde::{Deserialize, Serialize};

/// Half-open character interval `[start, end)` into a document's text
///
/// Offsets count Unicode scalar values (chars), not bytes, so intervals are
/// stable across encodings and safe to surface to non-Rust consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharInterval {
    /// First character covered
    pub start: u32,
    /// One past the last character covered
    pub end: u32,
}

impl CharInterval {
    /// Create a new interval; `start` must not exceed `end`
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "interval start {} > end {}", start, end);
        Self { start, end }
    }

    /// Number of characters covered
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the interval covers no characters
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two intervals share at least one character
    pub fn overlaps(&self, other: &CharInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely inside this interval
    pub fn contains(&self, other: &CharInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Half-open token interval `[start, end)` into a document's token sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenInterval {
    /// Index of the first token covered
    pub start: u32,
    /// One past the index of the last token covered
    pub end: u32,
}

impl TokenInterval {
    /// Create a new interval; `start` must not exceed `end`
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "interval start {} > end {}", start, end);
        Self { start, end }
    }

    /// Number of tokens covered
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the interval covers no tokens
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two intervals share at least one token
    pub fn overlaps(&self, other: &TokenInterval) -> bool {
        self.start < other.end && other.start < self.end
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn interval() -> impl Strategy<Value = CharInterval> {
        (0u32..1000, 0u32..100).prop_map(|(s, l)| CharInterval::new(s, s + l))
    }

    proptest! {
        /// Property: overlap is symmetric
        #[test]
        fn test_overlap_symmetric(a in interval(), b in interval()) {
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        /// Property: a non-empty interval overlaps itself; an empty one never does
        #[test]
        fn test_self_overlap(a in interval()) {
            prop_assert_eq!(a.overlaps(&a), !a.is_empty());
        }

        /// Property: containment implies overlap for non-empty intervals
        #[test]
        fn test_contains_implies_overlap(a in interval(), b in interval()) {
            if a.contains(&b) && !b.is_empty() {
                prop_assert!(a.overlaps(&b));
            }
        }
    }
}
