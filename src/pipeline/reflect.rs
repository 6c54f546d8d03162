//! REFLECT: annotation without new claims.
//!
//! The only permitted additions are drawn from vocabulary already present
//! in the answer or its cited chunks; the vocabulary guard enforces that.
//! In natural-chat mode the answer is reflowed into prose, keeping the
//! factual sentences and the cited chunk-id set unchanged.

use crate::arabic::{normalize_for_matching, split_sentences};
use crate::pipeline::context::{InterpretedAnswer, ReflectOutput};
use crate::schema::{EvidencePacket, Mode};
use std::collections::HashSet;

pub fn run_reflect(
    mode: Mode,
    answer: &InterpretedAnswer,
    packets: &[EvidencePacket],
) -> ReflectOutput {
    if answer.not_found {
        return ReflectOutput {
            answer_ar: answer.answer_ar.clone(),
            annotation_added: false,
        };
    }

    let mut text = answer.answer_ar.clone();
    if mode == Mode::NaturalChat {
        text = reflow_prose(&text);
    }

    // Candidate annotation: a boundary clause surfaced by the argument
    // chains. Appended only when the vocabulary guard allows it.
    let mut annotation_added = false;
    if let Some(boundary) = answer
        .argument_chains
        .iter()
        .find_map(|c| c.boundary_ar.as_deref())
    {
        let cited_texts: Vec<&str> = packets
            .iter()
            .filter(|p| answer.citations.iter().any(|c| c.chunk_id == p.chunk.id))
            .map(|p| p.chunk.text_ar.as_str())
            .collect();
        if annotation_allowed(boundary, &answer.answer_ar, &cited_texts)
            && !normalize_for_matching(&text).contains(&normalize_for_matching(boundary))
        {
            text = format!("{text}\n{boundary}");
            annotation_added = true;
        }
    }

    ReflectOutput {
        answer_ar: text,
        annotation_added,
    }
}

/// Whether every token of `candidate` already occurs in the answer or a
/// cited chunk.
pub fn annotation_allowed(candidate: &str, answer_ar: &str, cited_texts: &[&str]) -> bool {
    let mut vocabulary: HashSet<String> = HashSet::new();
    for source in std::iter::once(answer_ar).chain(cited_texts.iter().copied()) {
        for token in normalize_for_matching(source).split_whitespace() {
            vocabulary.insert(token.to_string());
        }
    }
    let candidate_norm = normalize_for_matching(candidate);
    !candidate_norm.is_empty()
        && candidate_norm
            .split_whitespace()
            .all(|t| vocabulary.contains(t))
}

/// Reflow a bulleted or sectioned answer into flowing prose. Sentences are
/// preserved verbatim and in order; only separators change.
fn reflow_prose(answer_ar: &str) -> String {
    let sentences = split_sentences(answer_ar);
    sentences
        .iter()
        .map(|s| s.trim_start_matches('-').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("، ")
}
