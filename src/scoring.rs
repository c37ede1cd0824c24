//! Text normalization and pronunciation scoring.
//!
//! Both the transcription and the expected answer go through the same
//! [`normalize_text`] before comparison; normalizing only one side is a
//! bug class this module exists to prevent.

use std::sync::LazyLock;

use regex::Regex;

/// Minimum similarity for an answer to count as correct. Policy constant,
/// applied strictly (`score > CORRECT_THRESHOLD`).
pub const CORRECT_THRESHOLD: f64 = 0.7;

/// Characters that are neither word characters nor whitespace; Unicode
/// classes so Hebrew letters and niqqud survive.
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Canonicalizes text for comparison: lower-case, strip everything that is
/// neither a word character nor whitespace, trim. Idempotent.
pub fn normalize_text(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    NON_WORD.replace_all(&lowered, "").trim().to_string()
}

/// Similarity of two canonical strings in `[0, 1]`: total length of the
/// greedily matched longest common blocks, doubled, over the combined
/// length of both strings (Ratcliff/Obershelp).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Whether a similarity score passes the correctness policy.
pub fn is_correct(score: f64) -> bool {
    score > CORRECT_THRESHOLD
}

/// Scales a similarity score to the 0-100 pronunciation score.
pub fn pronunciation_score(score: f64) -> u8 {
    (score.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Total matched characters: the longest common block, then recursively
/// the pieces to its left and right.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (ai, bi, len) = longest_match(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..ai], &b[..bi])
        + matching_chars(&a[ai + len..], &b[bi + len..])
}

/// Leftmost longest common contiguous block of `a` and `b`, returned as
/// `(start_in_a, start_in_b, length)`.
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j]: length of the common block ending at a[i] and b[j].
    let mut lengths = vec![0usize; b.len()];

    for (i, &ca) in a.iter().enumerate() {
        let mut new_lengths = vec![0usize; b.len()];
        for (j, &cb) in b.iter().enumerate() {
            if ca != cb {
                continue;
            }
            let len = if j == 0 { 1 } else { lengths[j - 1] + 1 };
            new_lengths[j] = len;
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        lengths = new_lengths;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(normalize_text("  Hello, World!  "), "hello world");
    }

    #[test]
    fn normalization_keeps_hebrew_letters() {
        assert_eq!(normalize_text("שָׁלוֹם!"), "שָׁלוֹם");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["  Hello, World!  ", "שָׁלוֹם?", "a  b\tc", ""] {
            let once = normalize_text(raw);
            assert_eq!(normalize_text(&once), once);
        }
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("man", "man"), 1.0);
        assert_eq!(similarity("שלום", "שלום"), 1.0);
    }

    #[test]
    fn empty_strings_score_one() {
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        for (a, b) in [("man", "men"), ("shalom", "shalum"), ("water", "watter")] {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn near_miss_scores_below_threshold() {
        // "man" vs "men": blocks "m" and "n", 2 * 2 / 6.
        let score = similarity("man", "men");
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
        assert!(!is_correct(score));
    }

    #[test]
    fn threshold_is_strict_at_the_boundary() {
        // 100 chars vs 71 matching + 29 disjoint: 2 * 71 / 200 = 0.71.
        let a = "a".repeat(100);
        let above = format!("{}{}", "a".repeat(71), "b".repeat(29));
        let score = similarity(&a, &above);
        assert!((score - 0.71).abs() < 1e-9);
        assert!(is_correct(score));

        // 2 * 69 / 200 = 0.69.
        let below = format!("{}{}", "a".repeat(69), "b".repeat(31));
        let score = similarity(&a, &below);
        assert!((score - 0.69).abs() < 1e-9);
        assert!(!is_correct(score));

        // Exactly at the threshold is not correct.
        assert!(!is_correct(CORRECT_THRESHOLD));
    }

    #[test]
    fn pronunciation_score_rounds_to_integer() {
        assert_eq!(pronunciation_score(1.0), 100);
        assert_eq!(pronunciation_score(0.0), 0);
        assert_eq!(pronunciation_score(2.0 / 3.0), 67);
    }

    #[test]
    fn longest_match_finds_leftmost_block() {
        let a: Vec<char> = "xxabcyy".chars().collect();
        let b: Vec<char> = "zzabcqq".chars().collect();
        assert_eq!(longest_match(&a, &b), (2, 2, 3));
    }
}
