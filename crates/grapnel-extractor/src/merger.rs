//! Multi-pass recall merging
//!
//! The first pass is the baseline; later passes only contribute extractions
//! whose char interval does not overlap an already-accepted extraction of the
//! same class. Different-class overlaps are kept so nested entities survive.

use grapnel_domain::Extraction;

/// Merges extractions from independent passes over the same chunk
#[derive(Debug, Clone, Copy, Default)]
pub struct PassMerger;

impl PassMerger {
    /// Merge per-pass extraction lists using first-pass-wins non-overlap
    ///
    /// Order preserves the original order within each pass and pass order
    /// across passes. Extractions without a char interval are always kept.
    pub fn merge(passes: Vec<Vec<Extraction>>) -> Vec<Extraction> {
        let mut merged: Vec<Extraction> = Vec::new();

        for (pass_index, pass) in passes.into_iter().enumerate() {
            for extraction in pass {
                if pass_index == 0 || Self::admissible(&extraction, &merged) {
                    merged.push(extraction);
                }
            }
        }

        merged
    }

    /// A later-pass extraction is admissible unless an accepted extraction of
    /// the same class overlaps it
    fn admissible(candidate: &Extraction, accepted: &[Extraction]) -> bool {
        let interval = match candidate.char_interval {
            Some(interval) => interval,
            None => return true,
        };

        !accepted.iter().any(|existing| {
            existing.class == candidate.class
                && existing
                    .char_interval
                    .map_or(false, |other| other.overlaps(&interval))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grapnel_domain::{AlignmentStatus, CharInterval};

    fn aligned(class: &str, start: u32, end: u32) -> Extraction {
        let mut extraction = Extraction::new(class, format!("{}..{}", start, end));
        extraction.char_interval = Some(CharInterval::new(start, end));
        extraction.alignment_status = AlignmentStatus::Exact;
        extraction
    }

    fn intervals(extractions: &[Extraction]) -> Vec<(u32, u32)> {
        extractions
            .iter()
            .map(|e| {
                let interval = e.char_interval.unwrap();
                (interval.start, interval.end)
            })
            .collect()
    }

    #[test]
    fn test_single_pass_unchanged() {
        let pass = vec![aligned("x", 0, 5), aligned("x", 10, 15)];
        let merged = PassMerger::merge(vec![pass.clone()]);
        assert_eq!(merged, pass);
    }

    #[test]
    fn test_overlapping_same_class_dropped() {
        let pass1 = vec![aligned("x", 0, 5), aligned("x", 10, 15)];
        let pass2 = vec![aligned("x", 3, 6), aligned("x", 20, 25)];

        let merged = PassMerger::merge(vec![pass1, pass2]);
        assert_eq!(intervals(&merged), vec![(0, 5), (10, 15), (20, 25)]);
    }

    #[test]
    fn test_different_class_overlap_kept() {
        let pass1 = vec![aligned("condition", 0, 20)];
        let pass2 = vec![aligned("organ", 6, 12)];

        let merged = PassMerger::merge(vec![pass1, pass2]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_unaligned_always_appended() {
        let pass1 = vec![aligned("x", 0, 5)];
        let pass2 = vec![Extraction::new("x", "ghost")];

        let merged = PassMerger::merge(vec![pass1, pass2]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].text, "ghost");
    }

    #[test]
    fn test_touching_intervals_do_not_overlap() {
        let pass1 = vec![aligned("x", 0, 5)];
        let pass2 = vec![aligned("x", 5, 9)];

        let merged = PassMerger::merge(vec![pass1, pass2]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_later_pass_order_preserved() {
        let pass1 = vec![aligned("x", 0, 5)];
        let pass2 = vec![aligned("x", 30, 35), aligned("x", 10, 15)];

        let merged = PassMerger::merge(vec![pass1, pass2]);
        assert_eq!(intervals(&merged), vec![(0, 5), (30, 35), (10, 15)]);
    }

    #[test]
    fn test_empty_input() {
        assert!(PassMerger::merge(Vec::new()).is_empty());
        assert!(PassMerger::merge(vec![Vec::new(), Vec::new()]).is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn pass_strategy() -> impl Strategy<Value = Vec<Extraction>> {
            proptest::collection::vec((0u32..50, 1u32..10, 0u8..3), 0..8).prop_map(|specs| {
                specs
                    .into_iter()
                    .map(|(start, len, class)| {
                        aligned(&format!("c{}", class), start, start + len)
                    })
                    .collect()
            })
        }

        proptest! {
            /// Property: merging one pass is the identity
            #[test]
            fn test_identity(pass in pass_strategy()) {
                prop_assert_eq!(PassMerger::merge(vec![pass.clone()]), pass);
            }

            /// Property: merging a pass with itself is idempotent
            #[test]
            fn test_idempotent(pass in pass_strategy()) {
                let merged = PassMerger::merge(vec![pass.clone(), pass.clone()]);
                prop_assert_eq!(merged, pass);
            }

            /// Property: the merge never drops first-pass extractions
            #[test]
            fn test_first_pass_wins(pass1 in pass_strategy(), pass2 in pass_strategy()) {
                let merged = PassMerger::merge(vec![pass1.clone(), pass2]);
                prop_assert_eq!(&merged[..pass1.len()], &pass1[..]);
            }
        }
    }
}
