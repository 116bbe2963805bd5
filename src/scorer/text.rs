//! Lenient text similarity for comparing transcriptions.
//!
//! ASR output rarely matches lyrics in punctuation or casing, and short
//! chunks often transcribe to a fragment of the expected line. Comparison is
//! therefore substring-aware: containment of the shorter string scores by
//! length ratio, and normalized Levenshtein covers the rest.

/// Similarity in [0, 1] between two texts.
///
/// Both empty scores 1 (silence matched silence); one empty scores 0.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }

    let levenshtein = strsim::normalized_levenshtein(&a, &b) as f32;

    // A fragment fully contained in the other text is a partial match even
    // when edit distance would punish the missing words.
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let containment = if longer.contains(shorter.as_str()) {
        shorter.len() as f32 / longer.len() as f32
    } else {
        0.0
    };

    levenshtein.max(containment)
}

/// Lowercases, strips punctuation, collapses whitespace.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if c.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_score_one() {
        assert!((text_similarity("hello world", "hello world") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_case_and_punctuation_ignored() {
        assert!((text_similarity("Hello, World!", "hello world") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_contained_fragment_scores_by_length_ratio() {
        let score = text_similarity("hello", "hello world again");
        assert!(score >= 5.0 / 17.0);
        assert!(score < 1.0);
    }

    #[test]
    fn test_unrelated_texts_score_low() {
        let score = text_similarity("twinkle twinkle little star", "zzz qqq vvv");
        assert!(score < 0.3);
    }

    #[test]
    fn test_both_empty_is_perfect() {
        assert_eq!(text_similarity("", ""), 1.0);
        assert_eq!(text_similarity("...", "!!!"), 1.0);
    }

    #[test]
    fn test_one_empty_is_zero() {
        assert_eq!(text_similarity("", "hello"), 0.0);
        assert_eq!(text_similarity("hello", ""), 0.0);
    }

    #[test]
    fn test_close_transcription_scores_high() {
        let score = text_similarity("twinkle twinkle litle star", "twinkle twinkle little star");
        assert!(score > 0.9);
    }
}
