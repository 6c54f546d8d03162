//! Deterministic Arabic text handling.
//!
//! Normalization for matching and embedding, stopword-aware keyword
//! extraction, and sentence segmentation. Everything in this module is a
//! pure function; the original question text is always preserved for
//! display and only normalized copies are used for matching.

mod keywords;
mod normalize;
mod sentences;

pub use keywords::{extract_keywords, is_stopword, strip_prefix_particles, token_set};
pub use normalize::{contains_arabic, normalize_for_embedding, normalize_for_matching};
pub use sentences::{sentence_spans, span_text, split_sentences, SentenceSpan};
