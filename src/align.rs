use serde::{Deserialize, Serialize};

/// Classification of one aligned position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharStatus {
    Correct,
    Incorrect,
    Missing,
    /// Typed character with no counterpart in the reference
    Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedChar {
    /// `None` only for `Extra` entries
    pub expected: Option<char>,
    /// `None` only for `Missing` entries
    pub typed: Option<char>,
    pub status: CharStatus,
}

/// Character-level alignment of typed text against a reference, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlignmentResult {
    chars: Vec<AlignedChar>,
}

impl AlignmentResult {
    /// Every aligned position, extras included, in text order
    pub fn chars(&self) -> &[AlignedChar] {
        &self.chars
    }

    /// One entry per reference character, in reference order
    pub fn reference_chars(&self) -> impl Iterator<Item = &AlignedChar> {
        self.chars.iter().filter(|c| c.expected.is_some())
    }

    pub fn reference_len(&self) -> usize {
        self.reference_chars().count()
    }

    pub fn count(&self, status: CharStatus) -> usize {
        self.chars.iter().filter(|c| c.status == status).count()
    }

    pub fn correct_count(&self) -> usize {
        self.count(CharStatus::Correct)
    }

    pub fn incorrect_count(&self) -> usize {
        self.count(CharStatus::Incorrect)
    }

    pub fn missing_count(&self) -> usize {
        self.count(CharStatus::Missing)
    }

    pub fn extra_count(&self) -> usize {
        self.count(CharStatus::Extra)
    }

    /// Correct characters over reference length, as a percentage. Extras
    /// neither add nor subtract.
    pub fn accuracy(&self) -> f64 {
        let reference_len = self.reference_len();
        if reference_len == 0 {
            return 0.0;
        }
        (self.correct_count() as f64 / reference_len as f64 * 100.0).clamp(0.0, 100.0)
    }
}

const DIAG: u8 = 0;
const UP: u8 = 1; // reference char skipped
const LEFT: u8 = 2; // typed char with no reference counterpart

/// Typed characters past the reference length that still take part in the
/// alignment; anything beyond is appended as extra.
const ALIGN_OVERRUN: usize = 256;

/// (edits, correct matches at the same index in both texts)
type Cost = (u32, u32);

fn better(a: Cost, b: Cost) -> bool {
    a.0 < b.0 || (a.0 == b.0 && a.1 > b.1)
}

/// Align `typed` against `reference` by minimum edit distance.
///
/// Among alignments with equal distance the one with the most correct
/// characters sitting at the same index in both strings wins, so a
/// transposition is scored as two substitutions rather than a gap plus a
/// lucky match. Remaining ties prefer substitution, then missing, then extra.
///
/// Only the first `ALIGN_OVERRUN` characters past the reference length are
/// aligned; the rest of the typed text is counted as extra.
pub fn align(reference: &str, typed: &str) -> AlignmentResult {
    let reference: Vec<char> = reference.chars().collect();
    let all_typed: Vec<char> = typed.chars().collect();
    let n = reference.len();
    let (typed, overflow) = all_typed.split_at(all_typed.len().min(n + ALIGN_OVERRUN));
    let m = typed.len();
    let width = m + 1;

    let mut dirs = vec![DIAG; (n + 1) * width];
    let mut prev: Vec<Cost> = (0..=m).map(|j| (j as u32, 0)).collect();
    let mut cur: Vec<Cost> = vec![(0, 0); width];
    for j in 1..=m {
        dirs[j] = LEFT;
    }

    for i in 1..=n {
        cur[0] = (i as u32, 0);
        dirs[i * width] = UP;
        for j in 1..=m {
            let matched = reference[i - 1] == typed[j - 1];
            let (edits, same) = prev[j - 1];
            let mut best = (
                edits + u32::from(!matched),
                same + u32::from(matched && i == j),
            );
            let mut dir = DIAG;

            let up = (prev[j].0 + 1, prev[j].1);
            if better(up, best) {
                best = up;
                dir = UP;
            }
            let left = (cur[j - 1].0 + 1, cur[j - 1].1);
            if better(left, best) {
                best = left;
                dir = LEFT;
            }

            cur[j] = best;
            dirs[i * width + j] = dir;
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let mut chars = Vec::with_capacity(n.max(m) + overflow.len());
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        match dirs[i * width + j] {
            DIAG => {
                let (expected, got) = (reference[i - 1], typed[j - 1]);
                chars.push(AlignedChar {
                    expected: Some(expected),
                    typed: Some(got),
                    status: if expected == got {
                        CharStatus::Correct
                    } else {
                        CharStatus::Incorrect
                    },
                });
                i -= 1;
                j -= 1;
            }
            UP => {
                chars.push(AlignedChar {
                    expected: Some(reference[i - 1]),
                    typed: None,
                    status: CharStatus::Missing,
                });
                i -= 1;
            }
            _ => {
                chars.push(AlignedChar {
                    expected: None,
                    typed: Some(typed[j - 1]),
                    status: CharStatus::Extra,
                });
                j -= 1;
            }
        }
    }
    chars.reverse();
    chars.extend(overflow.iter().map(|&c| AlignedChar {
        expected: None,
        typed: Some(c),
        status: CharStatus::Extra,
    }));

    AlignmentResult { chars }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn statuses(result: &AlignmentResult) -> Vec<CharStatus> {
        result.reference_chars().map(|c| c.status).collect()
    }

    #[test]
    fn test_identical_text_is_all_correct() {
        let result = align("hello world", "hello world");

        assert_eq!(result.correct_count(), 11);
        assert_eq!(result.incorrect_count(), 0);
        assert_eq!(result.missing_count(), 0);
        assert_eq!(result.extra_count(), 0);
        assert_eq!(result.accuracy(), 100.0);
    }

    #[test]
    fn test_empty_typed_is_all_missing() {
        let result = align("abc", "");

        assert_eq!(statuses(&result), vec![CharStatus::Missing; 3]);
        assert_eq!(result.accuracy(), 0.0);
    }

    #[test]
    fn test_dropped_character_is_missing() {
        let result = align("hello world", "hello wrld");

        let expected: Vec<CharStatus> = "hello world"
            .chars()
            .enumerate()
            .map(|(i, _)| {
                if i == 7 {
                    CharStatus::Missing
                } else {
                    CharStatus::Correct
                }
            })
            .collect();
        assert_eq!(statuses(&result), expected);
        assert_eq!(result.reference_chars().nth(7).unwrap().expected, Some('o'));
        assert!((result.accuracy() - 10.0 / 11.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_substitution_is_incorrect() {
        let result = align("test", "tast");

        assert_eq!(
            statuses(&result),
            vec![
                CharStatus::Correct,
                CharStatus::Incorrect,
                CharStatus::Correct,
                CharStatus::Correct
            ]
        );
        assert_eq!(result.reference_chars().nth(1).unwrap().typed, Some('a'));
        assert_eq!(result.accuracy(), 75.0);
    }

    #[test]
    fn test_trailing_extra_does_not_inflate_accuracy() {
        let result = align("hello", "hellooo");

        assert_eq!(result.correct_count(), 5);
        assert_eq!(result.extra_count(), 2);
        assert_eq!(result.reference_len(), 5);
        assert_eq!(result.accuracy(), 100.0);
    }

    #[test]
    fn test_transposition_scores_as_two_substitutions() {
        let result = align("the", "teh");

        assert_eq!(
            statuses(&result),
            vec![
                CharStatus::Correct,
                CharStatus::Incorrect,
                CharStatus::Incorrect
            ]
        );
        assert_eq!(result.extra_count(), 0);
    }

    #[test]
    fn test_inserted_character_is_extra() {
        let result = align("abc", "abxc");

        assert_eq!(statuses(&result), vec![CharStatus::Correct; 3]);
        assert_eq!(result.extra_count(), 1);
        assert_eq!(result.chars()[2].typed, Some('x'));
        assert_eq!(result.chars()[2].status, CharStatus::Extra);
    }

    #[test]
    fn test_empty_reference() {
        let result = align("", "abc");

        assert_eq!(result.reference_len(), 0);
        assert_eq!(result.extra_count(), 3);
        assert_eq!(result.accuracy(), 0.0);
    }

    #[test]
    fn test_unicode_characters() {
        let result = align("naïve café", "naive café");

        assert_eq!(result.incorrect_count(), 1);
        assert_eq!(result.correct_count(), 9);
    }

    #[test]
    fn test_runaway_typing_past_reference_is_extra() {
        let typed = format!("abc{}", "x".repeat(100_000));
        let result = align("abc", &typed);

        assert_eq!(result.correct_count(), 3);
        assert_eq!(result.extra_count(), 100_000);
        assert_eq!(result.chars().len(), 100_003);
        assert_eq!(result.accuracy(), 100.0);
        let last = result.chars().last().unwrap();
        assert_eq!((last.expected, last.typed), (None, Some('x')));
    }

    proptest! {
        #[test]
        fn self_alignment_is_perfect(text in "\\PC{0,40}") {
            let result = align(&text, &text);
            prop_assert_eq!(result.correct_count(), text.chars().count());
            prop_assert_eq!(result.extra_count(), 0);
            prop_assert_eq!(result.missing_count(), 0);
            prop_assert_eq!(result.incorrect_count(), 0);
        }

        #[test]
        fn alignment_covers_both_texts(reference in "[a-d ]{0,30}", typed in "[a-d ]{0,30}") {
            let result = align(&reference, &typed);
            let rebuilt_reference: String = result.chars().iter().filter_map(|c| c.expected).collect();
            let rebuilt_typed: String = result.chars().iter().filter_map(|c| c.typed).collect();
            prop_assert_eq!(rebuilt_reference, reference);
            prop_assert_eq!(rebuilt_typed, typed);
            prop_assert!(result.accuracy() >= 0.0 && result.accuracy() <= 100.0);
        }
    }
}
