//! Three-tier source grounding
//!
//! Maps each proto-extraction to a char interval of its chunk. Tiers, in
//! order: exact contiguous token match, fuzzy windowed match with a cheap
//! multiset pre-filter and an LCS scorer, and a "lesser" match where a source
//! window shorter than the query is explained by part of it.
//!
//! Extractions are aligned in emission order and may claim overlapping
//! source ranges; nested entities depend on that.

use crate::config::ExtractConfig;
use crate::normalizer::RawExtraction;
use crate::tokenizer::{TokenSpan, Tokenizer};
use grapnel_domain::{AlignmentStatus, CharInterval, Extraction, TokenInterval};
use std::collections::HashMap;

/// A window of the source token sequence an extraction grounded to
#[derive(Debug, Clone, Copy)]
struct WindowHit {
    start: usize,
    len: usize,
    status: AlignmentStatus,
}

/// Grounds proto-extractions against a chunk's token spans
#[derive(Debug, Clone)]
pub struct Aligner {
    tokenizer: Tokenizer,
    fuzzy_threshold: f64,
    lesser_threshold: f64,
    accept_lesser: bool,
    fuzzy_slack: f64,
    attribute_suffix: String,
}

impl Aligner {
    /// Create an aligner from pipeline configuration
    pub fn new(config: &ExtractConfig) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            fuzzy_threshold: config.fuzzy_threshold,
            lesser_threshold: config.lesser_threshold,
            accept_lesser: config.accept_lesser,
            fuzzy_slack: config.fuzzy_slack,
            attribute_suffix: config.attribute_suffix.clone(),
        }
    }

    /// Align proto-extractions against the owning chunk's tokens
    ///
    /// `source` must be the chunk's token spans; char offsets in the result
    /// are document-absolute because the spans carry absolute offsets.
    ///
    /// Attribute extractions (class ends with the attribute suffix, or empty
    /// text) own no span; they inherit the interval and status of the most
    /// recent preceding non-attribute extraction with the same group index.
    pub fn align(&self, raws: Vec<RawExtraction>, source: &[TokenSpan]) -> Vec<Extraction> {
        let source_norms: Vec<&str> = source.iter().map(|t| t.normalized.as_str()).collect();
        let mut out: Vec<Extraction> = Vec::with_capacity(raws.len());
        let mut parent_by_group: HashMap<u32, usize> = HashMap::new();

        for raw in raws {
            let is_attribute =
                raw.class.ends_with(&self.attribute_suffix) || raw.text.trim().is_empty();
            let mut extraction = Extraction {
                class: raw.class,
                text: raw.text,
                attributes: raw.attributes,
                char_interval: None,
                token_interval: None,
                alignment_status: AlignmentStatus::Unaligned,
                group_index: raw.group_index,
            };

            if is_attribute {
                if let Some(&parent_idx) = parent_by_group.get(&extraction.group_index) {
                    let parent = &out[parent_idx];
                    extraction.char_interval = parent.char_interval;
                    extraction.token_interval = parent.token_interval;
                    extraction.alignment_status = parent.alignment_status;
                }
                out.push(extraction);
                continue;
            }

            let query_owned = self.tokenizer.normalize_terms(&extraction.text);
            let query: Vec<&str> = query_owned.iter().map(String::as_str).collect();

            if let Some(hit) = self.align_one(&query, &source_norms) {
                let first = &source[hit.start];
                let last = &source[hit.start + hit.len - 1];
                extraction.char_interval = Some(CharInterval::new(first.char_start, last.char_end));
                extraction.token_interval =
                    Some(TokenInterval::new(first.token_index, last.token_index + 1));
                extraction.alignment_status = hit.status;
            }

            parent_by_group.insert(extraction.group_index, out.len());
            out.push(extraction);
        }

        out
    }

    fn align_one(&self, query: &[&str], source: &[&str]) -> Option<WindowHit> {
        if query.is_empty() || source.is_empty() {
            return None;
        }

        if let Some(start) = exact_match(query, source) {
            return Some(WindowHit {
                start,
                len: query.len(),
                status: AlignmentStatus::Exact,
            });
        }

        if let Some(hit) = self.fuzzy_match(query, source) {
            return Some(hit);
        }

        if self.accept_lesser {
            return self.lesser_match(query, source);
        }

        None
    }

    /// Windowed fuzzy matching with a multiset pre-filter
    ///
    /// Window sizes range over `±fuzzy_slack` around the query length. The
    /// cheap filter counts key-bucket intersection with the query multiset
    /// and skips windows that cannot reach the threshold; survivors are
    /// scored by token-LCS against the query.
    fn fuzzy_match(&self, query: &[&str], source: &[&str]) -> Option<WindowHit> {
        let n = query.len();
        let s = source.len();
        let w_min = (((n as f64) * (1.0 - self.fuzzy_slack)).ceil() as usize).max(1);
        let w_max = (((n as f64) * (1.0 + self.fuzzy_slack)).ceil() as usize).min(s);
        if w_min > w_max {
            return None;
        }
        let need = ((n as f64) * self.fuzzy_threshold).ceil() as usize;

        let query_keys: Vec<&str> = query.iter().map(|t| filter_key(t)).collect();
        let source_keys: Vec<&str> = source.iter().map(|t| filter_key(t)).collect();
        let mut base_counts: HashMap<&str, i32> = HashMap::new();
        for &key in &query_keys {
            *base_counts.entry(key).or_insert(0) += 1;
        }

        // Best is (ratio desc, window asc, start asc); iterating windows
        // ascending and starts ascending means a strict ratio improvement is
        // the only reason to replace
        let mut best: Option<(f64, usize, usize)> = None;
        for w in w_min..=w_max {
            let mut counts = base_counts.clone();
            let mut intersection = 0usize;
            for &key in &source_keys[..w] {
                add_key(&mut counts, &mut intersection, key);
            }

            let mut start = 0;
            loop {
                if intersection >= need {
                    let matched = lcs_tokens(query, &source[start..start + w]);
                    let ratio = matched as f64 / n as f64;
                    if best.map_or(true, |(br, _, _)| ratio > br) {
                        best = Some((ratio, w, start));
                    }
                }
                if start + w >= s {
                    break;
                }
                remove_key(&mut counts, &mut intersection, source_keys[start]);
                add_key(&mut counts, &mut intersection, source_keys[start + w]);
                start += 1;
            }
        }

        match best {
            Some((ratio, len, start)) if ratio >= self.fuzzy_threshold => Some(WindowHit {
                start,
                len,
                status: AlignmentStatus::Fuzzy,
            }),
            _ => None,
        }
    }

    /// Locate a source window shorter than the query that part of the query
    /// explains: the window's tokens must appear in the query in order, with
    /// coverage `matched / window_len >= lesser_threshold`
    fn lesser_match(&self, query: &[&str], source: &[&str]) -> Option<WindowHit> {
        let n = query.len();
        let s = source.len();
        let w_max = n.min(s);

        // Best is (matched desc, window asc, start asc); same iteration-order
        // argument as the fuzzy pass
        let mut best: Option<(usize, usize, usize)> = None;
        for w in 1..=w_max {
            for start in 0..=(s - w) {
                let matched = lcs_tokens(query, &source[start..start + w]);
                if matched == 0 {
                    continue;
                }
                if (matched as f64) < (w as f64) * self.lesser_threshold {
                    continue;
                }
                if best.map_or(true, |(bm, _, _)| matched > bm) {
                    best = Some((matched, w, start));
                }
            }
        }

        best.map(|(_, len, start)| WindowHit {
            start,
            len,
            status: AlignmentStatus::Lesser,
        })
    }
}

/// Smallest-indexed contiguous exact match of the normalized query
fn exact_match(query: &[&str], source: &[&str]) -> Option<usize> {
    if query.len() > source.len() {
        return None;
    }
    source.windows(query.len()).position(|window| window == query)
}

/// Bucket key for the cheap filter: the token's first three chars
///
/// Soft-matching tokens always share this prefix, so bucketing by it keeps
/// the filter sound (a superset of true matches passes).
fn filter_key(token: &str) -> &str {
    match token.char_indices().nth(3) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

/// Token equivalence for fuzzy scoring: exact, or one token is a prefix of
/// the other covering at least two thirds of it (singular/plural and light
/// inflection)
fn tokens_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let short_len = short.chars().count();
    let long_len = long.chars().count();
    short_len >= 3 && long.starts_with(short) && 3 * short_len >= 2 * long_len
}

/// Length of the longest common subsequence of query and window tokens
fn lcs_tokens(query: &[&str], window: &[&str]) -> usize {
    let mut prev = vec![0usize; window.len() + 1];
    let mut cur = vec![0usize; window.len() + 1];
    for q in query {
        for (wi, w) in window.iter().enumerate() {
            cur[wi + 1] = if tokens_match(q, w) {
                prev[wi] + 1
            } else {
                cur[wi].max(prev[wi + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[window.len()]
}

fn add_key<'a>(counts: &mut HashMap<&'a str, i32>, intersection: &mut usize, key: &'a str) {
    let entry = counts.entry(key).or_insert(0);
    if *entry > 0 {
        *intersection += 1;
    }
    *entry -= 1;
}

fn remove_key<'a>(counts: &mut HashMap<&'a str, i32>, intersection: &mut usize, key: &'a str) {
    let entry = counts.entry(key).or_insert(0);
    *entry += 1;
    if *entry > 0 {
        *intersection -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grapnel_domain::AttributeValue;
    use std::collections::BTreeMap;

    fn aligner() -> Aligner {
        Aligner::new(&ExtractConfig::default())
    }

    fn raw(class: &str, text: &str, group_index: u32) -> RawExtraction {
        RawExtraction {
            class: class.to_string(),
            text: text.to_string(),
            attributes: BTreeMap::new(),
            group_index,
        }
    }

    fn align_on(text: &str, raws: Vec<RawExtraction>) -> Vec<Extraction> {
        let tokens = Tokenizer::new().tokenize(text);
        aligner().align(raws, &tokens)
    }

    #[test]
    fn test_exact_alignment() {
        let out = align_on(
            "Patient takes aspirin 500mg daily.",
            vec![raw("medication", "aspirin 500mg", 0)],
        );
        assert_eq!(out[0].alignment_status, AlignmentStatus::Exact);
        assert_eq!(out[0].char_interval, Some(CharInterval::new(14, 27)));
        assert_eq!(out[0].token_interval, Some(TokenInterval::new(2, 4)));
    }

    #[test]
    fn test_exact_prefers_smallest_index() {
        let out = align_on("red fish and red fish again", vec![raw("e", "red fish", 0)]);
        assert_eq!(out[0].char_interval, Some(CharInterval::new(0, 8)));
    }

    #[test]
    fn test_fuzzy_plural() {
        let out = align_on("The chairs were arranged.", vec![raw("object", "chair", 0)]);
        assert_eq!(out[0].alignment_status, AlignmentStatus::Fuzzy);
        assert_eq!(out[0].char_interval, Some(CharInterval::new(4, 10)));
    }

    #[test]
    fn test_fuzzy_dropped_token() {
        // Query has 4 tokens, source window misses one: ratio 3/4 meets the
        // default threshold
        let out = align_on(
            "He was given strong pain medication today.",
            vec![raw("treatment", "given very strong pain", 0)],
        );
        assert_eq!(out[0].alignment_status, AlignmentStatus::Fuzzy);
        let interval = out[0].char_interval.unwrap();
        assert_eq!(interval.start, 7);
    }

    #[test]
    fn test_lesser_alignment() {
        let out = align_on("He took ibuprofen.", vec![raw("medication", "the drug ibuprofen", 0)]);
        assert_eq!(out[0].alignment_status, AlignmentStatus::Lesser);
        assert_eq!(out[0].char_interval, Some(CharInterval::new(8, 17)));
    }

    #[test]
    fn test_lesser_disabled() {
        let config = ExtractConfig {
            accept_lesser: false,
            ..Default::default()
        };
        let tokens = Tokenizer::new().tokenize("He took ibuprofen.");
        let out = Aligner::new(&config).align(vec![raw("m", "the drug ibuprofen", 0)], &tokens);
        assert_eq!(out[0].alignment_status, AlignmentStatus::Unaligned);
    }

    #[test]
    fn test_unaligned() {
        let out = align_on("Hello world.", vec![raw("entity", "completely unrelated phrase", 0)]);
        assert_eq!(out[0].alignment_status, AlignmentStatus::Unaligned);
        assert!(out[0].char_interval.is_none());
        assert!(out[0].token_interval.is_none());
    }

    #[test]
    fn test_attribute_inherits_parent_interval() {
        let mut attrs = BTreeMap::new();
        attrs.insert("unit".to_string(), AttributeValue::Str("mg".to_string()));
        let out = align_on(
            "Patient takes aspirin daily.",
            vec![
                raw("medication", "aspirin", 0),
                RawExtraction {
                    class: "medication_attributes".to_string(),
                    text: String::new(),
                    attributes: attrs,
                    group_index: 0,
                },
            ],
        );
        assert_eq!(out[1].char_interval, out[0].char_interval);
        assert_eq!(out[1].alignment_status, AlignmentStatus::Exact);
    }

    #[test]
    fn test_attribute_without_parent_stays_unaligned() {
        let out = align_on(
            "Patient takes aspirin daily.",
            vec![RawExtraction {
                class: "dose_attributes".to_string(),
                text: String::new(),
                attributes: BTreeMap::new(),
                group_index: 5,
            }],
        );
        assert_eq!(out[0].alignment_status, AlignmentStatus::Unaligned);
    }

    #[test]
    fn test_attribute_parent_matches_group() {
        let out = align_on(
            "Aspirin and ibuprofen are painkillers.",
            vec![
                raw("medication", "aspirin", 0),
                raw("medication", "ibuprofen", 1),
                RawExtraction {
                    class: "medication_attributes".to_string(),
                    text: String::new(),
                    attributes: BTreeMap::new(),
                    group_index: 0,
                },
            ],
        );
        // The attribute belongs to group 0: aspirin, not ibuprofen
        assert_eq!(out[2].char_interval, out[0].char_interval);
    }

    #[test]
    fn test_overlapping_claims_allowed() {
        let out = align_on(
            "acute kidney failure",
            vec![raw("condition", "acute kidney failure", 0), raw("organ", "kidney", 1)],
        );
        assert_eq!(out[0].alignment_status, AlignmentStatus::Exact);
        assert_eq!(out[1].alignment_status, AlignmentStatus::Exact);
        assert!(out[0]
            .char_interval
            .unwrap()
            .overlaps(&out[1].char_interval.unwrap()));
    }

    #[test]
    fn test_exact_ignores_case_and_diacritics() {
        let out = align_on("Prescribed Paracétamol yesterday.", vec![raw("m", "paracetamol", 0)]);
        assert_eq!(out[0].alignment_status, AlignmentStatus::Exact);
    }

    #[test]
    fn test_unrelated_long_source_rejected() {
        let source: String = (0..200).map(|i| format!("word{} ", i)).collect();
        let out = align_on(&source, vec![raw("e", "zebra quark nimbus flute echo", 0)]);
        assert_eq!(out[0].alignment_status, AlignmentStatus::Unaligned);
    }

    #[test]
    fn test_fuzzy_ratio_honors_threshold() {
        // 2 of 4 query tokens present: ratio 0.5 < 0.75, lesser tier is off
        let config = ExtractConfig {
            accept_lesser: false,
            ..Default::default()
        };
        let tokens = Tokenizer::new().tokenize("alpha beta gamma delta");
        let out =
            Aligner::new(&config).align(vec![raw("e", "alpha beta zeta omega", 0)], &tokens);
        assert_eq!(out[0].alignment_status, AlignmentStatus::Unaligned);
    }

    #[test]
    fn test_tokens_match_rules() {
        assert!(tokens_match("chair", "chair"));
        assert!(tokens_match("chair", "chairs"));
        assert!(tokens_match("runs", "run"));
        assert!(!tokens_match("the", "there"));
        assert!(!tokens_match("in", "inside"));
        assert!(!tokens_match("cat", "dog"));
    }

    #[test]
    fn test_lcs_tokens() {
        assert_eq!(lcs_tokens(&["a", "b", "c"], &["a", "x", "c"]), 2);
        assert_eq!(lcs_tokens(&["a", "b"], &["b", "a"]), 1);
        assert_eq!(lcs_tokens(&[], &["a"]), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: alignment is deterministic
            #[test]
            fn test_deterministic(
                source in "[a-z]{1,8}( [a-z]{1,8}){0,30}",
                query in "[a-z]{1,8}( [a-z]{1,8}){0,5}",
            ) {
                let tokens = Tokenizer::new().tokenize(&source);
                let a = aligner().align(vec![raw("e", &query, 0)], &tokens);
                let b = aligner().align(vec![raw("e", &query, 0)], &tokens);
                prop_assert_eq!(a, b);
            }

            /// Property: an aligned interval always lies inside the source span
            #[test]
            fn test_interval_within_source(
                source in "[a-z]{1,8}( [a-z]{1,8}){0,30}",
                query in "[a-z]{1,8}( [a-z]{1,8}){0,5}",
            ) {
                let tokens = Tokenizer::new().tokenize(&source);
                let out = aligner().align(vec![raw("e", &query, 0)], &tokens);
                if let Some(interval) = out[0].char_interval {
                    let last = tokens.last().unwrap();
                    prop_assert!(interval.start >= tokens[0].char_start);
                    prop_assert!(interval.end <= last.char_end);
                    prop_assert!(!interval.is_empty());
                }
            }

            /// Property: an exact match covers a span whose normalized
            /// tokens equal the query's normalized tokens
            #[test]
            fn test_exact_span_tokens_equal_query(
                source in "[a-z]{1,8}( [a-z]{1,8}){0,30}",
                query in "[a-z]{1,8}( [a-z]{1,8}){0,5}",
            ) {
                let tokenizer = Tokenizer::new();
                let tokens = tokenizer.tokenize(&source);
                let out = aligner().align(vec![raw("e", &query, 0)], &tokens);
                if out[0].alignment_status == AlignmentStatus::Exact {
                    let interval = out[0].char_interval.unwrap();
                    let span = &source[interval.start as usize..interval.end as usize];
                    prop_assert_eq!(
                        tokenizer.normalize_terms(span),
                        tokenizer.normalize_terms(&query)
                    );
                }
            }

            /// Property: text present verbatim in the source aligns exactly
            #[test]
            fn test_verbatim_text_is_exact(
                prefix in "[a-z]{1,8}( [a-z]{1,8}){0,5}",
                needle in "[a-z]{3,8}( [a-z]{3,8}){0,3}",
                suffix in "[a-z]{1,8}( [a-z]{1,8}){0,5}",
            ) {
                let source = format!("{} {} {}", prefix, needle, suffix);
                let tokens = Tokenizer::new().tokenize(&source);
                let out = aligner().align(vec![raw("e", &needle, 0)], &tokens);
                prop_assert_eq!(out[0].alignment_status, AlignmentStatus::Exact);
            }
        }
    }
}
