//! Keyword extraction.
//!
//! Normalizes, drops stopwords, and exposes prefix-particle stripping for
//! match keys. Stripping is only applied to match keys; the keywords kept
//! for relevance checking retain their surface form (normalized).

use super::normalize::normalize_for_matching;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Common Arabic stopwords, stored normalized.
fn stopwords() -> &'static HashSet<String> {
    static SET: OnceLock<HashSet<String>> = OnceLock::new();
    SET.get_or_init(|| {
        [
            // Particles and prepositions
            "من", "الى", "على", "في", "عن", "مع", "ب", "ك", "ل", "ف", "س",
            // Demonstratives and relatives
            "هذا", "هذه", "ذلك", "تلك", "الذي", "التي", "الذين",
            // Conjunctions
            "و", "او", "ام", "ثم", "لكن", "بل", "حتى", "اذا", "اذ", "لو", "كي",
            // Pronouns and common verbs
            "هو", "هي", "هم", "هن", "انا", "نحن", "انت", "انتم", "كان", "يكون",
            // Question words and misc
            "ما", "ماذا", "كيف", "هل", "ان", "لا", "قد", "كل", "بعض", "غير",
        ]
        .iter()
        .map(|w| normalize_for_matching(w))
        .collect()
    })
}

pub fn is_stopword(normalized_token: &str) -> bool {
    stopwords().contains(normalized_token)
}

/// Strip the common prefix particles (و ف ال ب ك ل) from a normalized
/// token, producing a match key. The surface token is kept for display and
/// relevance checks.
pub fn strip_prefix_particles(token: &str) -> &str {
    let mut t = token;
    // One conjunction/preposition letter, then the article.
    for particle in ["و", "ف", "ب", "ك", "ل"] {
        if let Some(rest) = t.strip_prefix(particle) {
            if rest.chars().count() >= 3 {
                t = rest;
            }
            break;
        }
    }
    if let Some(rest) = t.strip_prefix("ال") {
        if rest.chars().count() >= 2 {
            t = rest;
        }
    }
    t
}

/// Extract normalized Arabic keywords, stopwords removed, single letters
/// dropped.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let normalized = normalize_for_matching(text);
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .filter(|w| w.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c)))
        .filter(|w| !is_stopword(w))
        .map(|w| w.to_string())
        .collect()
}

/// Token set (length >= `min_len`) of a normalized text, for overlap
/// scoring.
pub fn token_set(normalized: &str, min_len: usize) -> HashSet<&str> {
    normalized
        .split_whitespace()
        .filter(|t| t.chars().count() >= min_len)
        .collect()
}
