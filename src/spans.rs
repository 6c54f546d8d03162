//! Citation span resolution.
//!
//! Locates answer sentences inside cited chunk text. Offsets are never
//! guessed: an exact (normalized) substring match resolves, a token
//! overlap at or above the threshold is approximate, anything else stays
//! unresolved. Tie-breaks between candidate sentences are deterministic:
//! higher overlap, then shorter span, then earlier start.

use crate::arabic::{normalize_for_matching, split_sentences, token_set};
use crate::schema::{ResolutionMethod, ResolutionStatus};

/// Default token-overlap threshold for an approximate match.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.6;

/// Quotes returned for display are clipped to this many words.
pub const MAX_QUOTE_WORDS: usize = 25;

/// Outcome of resolving one citation against its chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanResolution {
    pub status: ResolutionStatus,
    pub method: ResolutionMethod,
    /// Overlap ratio of the best sentence (1.0 for exact matches).
    pub score: f64,
    /// Clipped quote of the matching sentence, when one was found.
    pub quote: Option<String>,
}

impl SpanResolution {
    fn unresolved() -> Self {
        Self {
            status: ResolutionStatus::Unresolved,
            method: ResolutionMethod::Fallback,
            score: 0.0,
            quote: None,
        }
    }
}

/// Resolver with a configurable overlap threshold.
#[derive(Debug, Clone)]
pub struct SpanResolver {
    overlap_threshold: f64,
}

impl Default for SpanResolver {
    fn default() -> Self {
        Self {
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
        }
    }
}

impl SpanResolver {
    pub fn new(overlap_threshold: f64) -> Self {
        Self { overlap_threshold }
    }

    /// Resolve a whole answer against one cited chunk: the best result
    /// across the answer's sentences.
    pub fn resolve(&self, answer_ar: &str, chunk_text_ar: &str) -> SpanResolution {
        let chunk_norm = normalize_for_matching(chunk_text_ar);
        if chunk_norm.is_empty() {
            return SpanResolution::unresolved();
        }
        let chunk_tokens = token_set(&chunk_norm, 3);

        let mut best = SpanResolution::unresolved();
        let mut best_len = usize::MAX;

        for sentence in split_sentences(answer_ar) {
            let resolution = self.resolve_sentence_prepared(&sentence, &chunk_norm, &chunk_tokens);
            let len = sentence.chars().count();
            let better = match resolution.status {
                ResolutionStatus::Resolved => {
                    best.status != ResolutionStatus::Resolved
                        || resolution.score > best.score
                        || (resolution.score == best.score && len < best_len)
                }
                ResolutionStatus::Approximate => {
                    best.status == ResolutionStatus::Unresolved
                        || (best.status == ResolutionStatus::Approximate
                            && (resolution.score > best.score
                                || (resolution.score == best.score && len < best_len)))
                }
                ResolutionStatus::Unresolved => false,
            };
            if better {
                best = resolution;
                best_len = len;
            }
        }
        best
    }

    /// Resolve a single sentence against a chunk.
    pub fn resolve_sentence(&self, sentence: &str, chunk_text_ar: &str) -> SpanResolution {
        let chunk_norm = normalize_for_matching(chunk_text_ar);
        if chunk_norm.is_empty() {
            return SpanResolution::unresolved();
        }
        let chunk_tokens = token_set(&chunk_norm, 3);
        self.resolve_sentence_prepared(sentence, &chunk_norm, &chunk_tokens)
    }

    fn resolve_sentence_prepared(
        &self,
        sentence: &str,
        chunk_norm: &str,
        chunk_tokens: &std::collections::HashSet<&str>,
    ) -> SpanResolution {
        let sentence_norm = normalize_for_matching(sentence);
        if sentence_norm.is_empty() {
            return SpanResolution::unresolved();
        }

        if chunk_norm.contains(&sentence_norm) {
            return SpanResolution {
                status: ResolutionStatus::Resolved,
                method: ResolutionMethod::ExactSubstring,
                score: 1.0,
                quote: Some(clip_to_word_budget(sentence, MAX_QUOTE_WORDS)),
            };
        }

        let sentence_tokens = token_set(&sentence_norm, 3);
        if sentence_tokens.is_empty() {
            return SpanResolution::unresolved();
        }
        let shared = sentence_tokens
            .iter()
            .filter(|t| chunk_tokens.contains(**t))
            .count();
        let ratio = shared as f64 / sentence_tokens.len() as f64;

        if ratio >= self.overlap_threshold {
            SpanResolution {
                status: ResolutionStatus::Approximate,
                method: ResolutionMethod::TokenOverlap,
                score: ratio,
                quote: Some(clip_to_word_budget(sentence, MAX_QUOTE_WORDS)),
            }
        } else {
            SpanResolution {
                status: ResolutionStatus::Unresolved,
                method: ResolutionMethod::Fallback,
                score: ratio,
                quote: None,
            }
        }
    }
}

/// Clip a quote to at most `max_words` whitespace-separated words.
pub fn clip_to_word_budget(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        words[..max_words].join(" ")
    }
}
