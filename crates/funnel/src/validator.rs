//! Guards every stage against answers that are not part of its candidate set.
//!
//! Stage 1 answers with names, stages 2 and 3 with option numbers. Names are
//! matched against the canonical top-level list; numbers are range-checked
//! against the list that was shown. Nothing the model says is trusted as-is.

use crate::config::{L1MatchPolicy, UnparseableFinalPolicy};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid integer regex"));

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]\s*|\d+[.)]\s+)").expect("valid list marker regex"));

/// Replies that explicitly decline to pick, compared after trimming,
/// lowercasing and stripping trailing periods
pub const NON_ANSWERS: &[&str] = &[
    "", "none", "null", "error", "fail", "false", "n/a", "na", "unknown",
];

const BATCH_NONE: &str = "NONE";

/// Outcome of validating a stage-1 reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopLevelValidation {
    /// Canonical names, deduplicated, capped, in reply order
    pub accepted: Vec<String>,
    /// Lines that matched nothing
    pub hallucinated: Vec<String>,
    /// `(reply line, canonical name)` pairs accepted through containment
    pub approximate: Vec<(String, String)>,
}

/// Outcome of parsing a stage-2 batch reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSelection {
    /// Valid 1-based option numbers, deduplicated, in reply order
    pub picks: Vec<usize>,
    /// Integers found in the reply that are not options of this batch
    pub out_of_range: Vec<u64>,
    /// The reply was the explicit "NONE" token
    pub explicit_none: bool,
}

/// Interpretation of a stage-3 reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalChoice {
    /// 0-based index into the candidate list
    Selected(usize),
    /// No usable number; the first candidate was taken under the lenient policy
    Defaulted,
    /// The first number in the reply is not an option (0 or above the count)
    OutOfRange(u64),
    /// One of [`NON_ANSWERS`]
    NonAnswer,
    /// No number and not a non-answer, under the strict policy
    Unparseable,
}

impl FinalChoice {
    /// Index to use, or `None` when the request must fail
    pub fn index(self) -> Option<usize> {
        match self {
            Self::Selected(idx) => Some(idx),
            Self::Defaulted => Some(0),
            Self::OutOfRange(_) | Self::NonAnswer | Self::Unparseable => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseValidator {
    l1_match: L1MatchPolicy,
    unparseable_final: UnparseableFinalPolicy,
}

impl ResponseValidator {
    pub fn new(l1_match: L1MatchPolicy, unparseable_final: UnparseableFinalPolicy) -> Self {
        Self {
            l1_match,
            unparseable_final,
        }
    }

    /// Validate a one-name-per-line reply against `canonical`.
    ///
    /// Each line is matched case-insensitively; under
    /// [`L1MatchPolicy::Containment`] a line that equals nothing is then
    /// matched to the first canonical name (in list order) that contains it
    /// or is contained by it. Results are deduplicated case-insensitively
    /// and capped at `limit`.
    pub fn validate_top_level(
        &self,
        reply: &str,
        canonical: &[String],
        limit: usize,
    ) -> TopLevelValidation {
        let mut validation = TopLevelValidation::default();
        let mut seen = HashSet::new();

        for line in reply.lines() {
            let value = normalize_line(line);
            if value.is_empty() {
                continue;
            }
            let lowered = value.to_lowercase();

            let exact = canonical.iter().find(|c| c.to_lowercase() == lowered);
            let matched = match (exact, self.l1_match) {
                (Some(name), _) => Some(name),
                (None, L1MatchPolicy::Containment) => {
                    let approx = canonical.iter().find(|c| {
                        let c = c.to_lowercase();
                        c.contains(&lowered) || lowered.contains(&c)
                    });
                    if let Some(name) = approx {
                        validation
                            .approximate
                            .push((value.to_string(), name.clone()));
                    }
                    approx
                }
                (None, L1MatchPolicy::Exact) => None,
            };

            match matched {
                Some(name) => {
                    if seen.insert(name.to_lowercase()) && validation.accepted.len() < limit {
                        validation.accepted.push(name.clone());
                    }
                }
                None => validation.hallucinated.push(value.to_string()),
            }
        }

        validation
    }

    /// Extract option numbers from a batch reply.
    ///
    /// Every run of ASCII digits anywhere in the reply counts as a number;
    /// numbers outside `1..=batch_len` are reported, not clamped. Every valid
    /// pick is kept, however many the reply lists.
    pub fn parse_batch_selection(&self, reply: &str, batch_len: usize) -> BatchSelection {
        let mut selection = BatchSelection::default();
        let trimmed = reply.trim();
        if trimmed.eq_ignore_ascii_case(BATCH_NONE) {
            selection.explicit_none = true;
            return selection;
        }

        let mut seen = HashSet::new();
        for token in INTEGER.find_iter(trimmed) {
            // Digit runs too long for u64 cannot be an option either
            let number = token.as_str().parse::<u64>().unwrap_or(u64::MAX);
            let in_range = number >= 1 && (number as u128) <= batch_len as u128;
            if !in_range {
                selection.out_of_range.push(number);
                continue;
            }

            let number = number as usize;
            if seen.insert(number) {
                selection.picks.push(number);
            }
        }

        selection
    }

    /// Interpret a stage-3 reply against `count` numbered candidates.
    ///
    /// The first integer anywhere in the reply decides (`"Option 2"` → 1,
    /// `"1.5"` → 0). A first integer of 0 or above `count` is rejected rather
    /// than clamped, whatever the unparseable policy. Replies without digits
    /// are either a recognised non-answer or fall under that policy.
    pub fn parse_final_choice(&self, reply: &str, count: usize) -> FinalChoice {
        let trimmed = reply.trim();

        if let Some(token) = INTEGER.find(trimmed) {
            let number = token.as_str().parse::<u64>().unwrap_or(u64::MAX);
            return if number >= 1 && (number as u128) <= count as u128 {
                FinalChoice::Selected(number as usize - 1)
            } else {
                FinalChoice::OutOfRange(number)
            };
        }

        if is_non_answer(trimmed) {
            return FinalChoice::NonAnswer;
        }

        match self.unparseable_final {
            UnparseableFinalPolicy::FirstCandidate => FinalChoice::Defaulted,
            UnparseableFinalPolicy::Fail => FinalChoice::Unparseable,
        }
    }
}

/// Strip list bullets, numbering and wrapping quotes from a reply line
fn normalize_line(line: &str) -> &str {
    let line = line.trim();
    let line = match LIST_MARKER.find(line) {
        Some(marker) => &line[marker.end()..],
        None => line,
    };
    line.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
}

fn is_non_answer(reply: &str) -> bool {
    let cleaned = reply
        .trim()
        .trim_end_matches('.')
        .trim_matches(|c| c == '"' || c == '\'')
        .to_lowercase();
    NON_ANSWERS.contains(&cleaned.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lenient() -> ResponseValidator {
        ResponseValidator::new(
            L1MatchPolicy::Containment,
            UnparseableFinalPolicy::FirstCandidate,
        )
    }

    fn strict() -> ResponseValidator {
        ResponseValidator::new(L1MatchPolicy::Exact, UnparseableFinalPolicy::Fail)
    }

    fn l1s() -> Vec<String> {
        ["Apparel & Accessories", "Electronics", "Home & Garden", "Shoe Care"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_top_level_exact_case_insensitive() {
        let v = lenient().validate_top_level("electronics\nHOME & GARDEN\n", &l1s(), 2);
        assert_eq!(v.accepted, vec!["Electronics", "Home & Garden"]);
        assert!(v.hallucinated.is_empty());
        assert!(v.approximate.is_empty());
    }

    #[test]
    fn test_top_level_containment_fallback() {
        let v = lenient().validate_top_level("Consumer Electronics\nApparel", &l1s(), 2);
        assert_eq!(v.accepted, vec!["Electronics", "Apparel & Accessories"]);
        assert_eq!(v.approximate.len(), 2);
        assert_eq!(v.approximate[0].1, "Electronics");
    }

    #[test]
    fn test_top_level_exact_policy_rejects_near_misses() {
        let v = strict().validate_top_level("Consumer Electronics\nElectronics", &l1s(), 2);
        assert_eq!(v.accepted, vec!["Electronics"]);
        assert_eq!(v.hallucinated, vec!["Consumer Electronics"]);
    }

    #[test]
    fn test_top_level_unrelated_words_do_not_conflate() {
        // "Shoes" is neither contained in nor contains "Shoe Care"
        let v = lenient().validate_top_level("Shoes", &l1s(), 2);
        assert!(v.accepted.is_empty());
        assert_eq!(v.hallucinated, vec!["Shoes"]);
    }

    #[test]
    fn test_top_level_drops_hallucinations_dedups_and_caps() {
        let reply = "Gadgets & Gizmos\n1. Electronics\n- electronics\n\nHome & Garden\nApparel & Accessories";
        let v = lenient().validate_top_level(reply, &l1s(), 2);
        assert_eq!(v.accepted, vec!["Electronics", "Home & Garden"]);
        assert_eq!(v.hallucinated, vec!["Gadgets & Gizmos"]);
    }

    #[test]
    fn test_batch_selection_extracts_all_integers() {
        let s = lenient().parse_batch_selection("3\n7\nOption 15 looks good", 20);
        assert_eq!(s.picks, vec![3, 7, 15]);
        assert!(s.out_of_range.is_empty());
        assert!(!s.explicit_none);
    }

    #[test]
    fn test_batch_selection_reports_out_of_range() {
        let s = lenient().parse_batch_selection("0\n2\n101\n2", 100);
        assert_eq!(s.picks, vec![2]);
        assert_eq!(s.out_of_range, vec![0, 101]);
    }

    #[test]
    fn test_batch_selection_none_token() {
        for reply in ["NONE", " none \n", "None"] {
            let s = lenient().parse_batch_selection(reply, 100);
            assert!(s.explicit_none, "{reply:?}");
            assert!(s.picks.is_empty());
        }
        let s = lenient().parse_batch_selection("No matches here", 100);
        assert!(!s.explicit_none);
        assert!(s.picks.is_empty());
    }

    #[test]
    fn test_batch_selection_keeps_every_valid_pick() {
        let reply = (1..=20).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let s = lenient().parse_batch_selection(&reply, 100);
        assert_eq!(s.picks, (1..=20).collect::<Vec<_>>());
        assert!(s.out_of_range.is_empty());
    }

    #[test]
    fn test_only_ascii_digits_count_as_numbers() {
        // Arabic-Indic three is not an option number
        let s = lenient().parse_batch_selection("\u{663}\n2", 10);
        assert_eq!(s.picks, vec![2]);
        assert!(s.out_of_range.is_empty());

        assert_eq!(lenient().parse_final_choice("\u{663}", 3), FinalChoice::Defaulted);
        assert_eq!(strict().parse_final_choice("\u{663}", 3), FinalChoice::Unparseable);
    }

    #[test]
    fn test_batch_selection_huge_number() {
        let s = lenient().parse_batch_selection("99999999999999999999999", 100);
        assert!(s.picks.is_empty());
        assert_eq!(s.out_of_range, vec![u64::MAX]);
    }

    #[test]
    fn test_final_choice_numbers() {
        let v = lenient();
        assert_eq!(v.parse_final_choice("1", 3), FinalChoice::Selected(0));
        assert_eq!(v.parse_final_choice("Option 2", 3), FinalChoice::Selected(1));
        assert_eq!(v.parse_final_choice("  3.\n", 3), FinalChoice::Selected(2));
        assert_eq!(v.parse_final_choice("1.5", 3), FinalChoice::Selected(0));
    }

    #[test]
    fn test_final_choice_out_of_range_is_not_clamped() {
        let v = lenient();
        assert_eq!(v.parse_final_choice("0", 3), FinalChoice::OutOfRange(0));
        assert_eq!(v.parse_final_choice("4", 3), FinalChoice::OutOfRange(4));
        assert_eq!(v.parse_final_choice("4", 3).index(), None);
        // Only the first number counts
        assert_eq!(v.parse_final_choice("7 or maybe 2", 3), FinalChoice::OutOfRange(7));
    }

    #[test]
    fn test_final_choice_out_of_range_fails_under_either_policy() {
        for v in [lenient(), strict()] {
            assert_eq!(v.parse_final_choice("7", 2), FinalChoice::OutOfRange(7));
            assert_eq!(v.parse_final_choice("7", 2).index(), None);
        }
    }

    #[test]
    fn test_final_choice_non_answers_fail() {
        let v = lenient();
        for reply in ["", "   ", "none", "NONE.", "error", "False", "n/a", "Unknown"] {
            assert_eq!(v.parse_final_choice(reply, 3), FinalChoice::NonAnswer, "{reply:?}");
            assert_eq!(v.parse_final_choice(reply, 3).index(), None);
        }
    }

    #[test]
    fn test_final_choice_unparseable_follows_policy() {
        let reply = "The smartphone category fits best";
        assert_eq!(lenient().parse_final_choice(reply, 3), FinalChoice::Defaulted);
        assert_eq!(lenient().parse_final_choice(reply, 3).index(), Some(0));
        assert_eq!(strict().parse_final_choice(reply, 3), FinalChoice::Unparseable);
        assert_eq!(strict().parse_final_choice(reply, 3).index(), None);
    }

    #[test]
    fn test_normalize_line() {
        assert_eq!(normalize_line("  1. Electronics "), "Electronics");
        assert_eq!(normalize_line("2) \"Home & Garden\""), "Home & Garden");
        assert_eq!(normalize_line("* Apparel"), "Apparel");
        assert_eq!(normalize_line("3D Printers"), "3D Printers");
    }
}
