//! Post-generation guardrails.
//!
//! Deterministic verification that runs after every model or fallback
//! answer: citation presence, evidence-id validity, must-cite sentence
//! coverage, and claim-to-evidence term coverage. The model's output is
//! pass A; these checks are pass B and they always win.

use crate::arabic::{extract_keywords, normalize_for_matching, split_sentences};
use crate::schema::{Citation, EvidencePacket, IntentKind, ResolutionStatus};
use crate::spans::SpanResolver;
use std::collections::{HashMap, HashSet};

/// Sentence markers that make a claim citable: definition verbs,
/// quantifiers, scriptural terms. Stored normalized.
const DEFINITION_MARKERS: &[&str] = &["هي", "هو", "تعني", "يعني", "يقصد", "تعريف", "التعريف"];
const QUANTIFIER_MARKERS: &[&str] = &[
    "خمس", "خمسه", "اربع", "اربعه", "ثلاث", "ثلاثه", "سبع", "عشر", "جميع", "عدد",
];
const SCRIPTURE_MARKERS: &[&str] = &[
    "قال تعالي",
    "قوله تعالي",
    "الايه",
    "سوره",
    "الحديث",
    "رواه",
    "النبي",
    "رسول الله",
];

/// Combined verdict of the guardrail pass.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardrailVerdict {
    /// Every must-cite sentence is covered.
    Pass,
    /// Some claims are weakly covered; outcome degrades to PASS_PARTIAL.
    Degrade,
    /// Definitional intent with an unresolved must-cite sentence; the
    /// response fails closed to a refusal.
    FailClosed,
}

/// Result of the guardrail pass.
#[derive(Debug, Clone)]
pub struct GuardrailReport {
    pub verdict: GuardrailVerdict,
    pub issues: Vec<String>,
    /// Citations that survived evidence-id verification.
    pub citations: Vec<Citation>,
    /// Cited chunk ids that were unknown and dropped.
    pub dropped: Vec<String>,
}

/// Deterministic answer validation.
pub struct Guardrails {
    resolver: SpanResolver,
    /// Minimum ratio of answer terms that must appear in cited evidence.
    min_term_coverage: f64,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            resolver: SpanResolver::default(),
            min_term_coverage: 0.5,
        }
    }
}

impl Guardrails {
    pub fn new(resolver: SpanResolver, min_term_coverage: f64) -> Self {
        Self {
            resolver,
            min_term_coverage,
        }
    }

    /// Validate an answer against its citations and the retrieved packets.
    pub fn validate(
        &self,
        answer_ar: &str,
        citations: Vec<Citation>,
        packets: &[EvidencePacket],
        intent: IntentKind,
        not_found: bool,
    ) -> GuardrailReport {
        let mut issues = Vec::new();

        if not_found {
            return GuardrailReport {
                verdict: GuardrailVerdict::Pass,
                issues,
                citations,
                dropped: Vec::new(),
            };
        }

        // Evidence-id verification: unknown chunk ids are dropped.
        let known: HashMap<&str, &EvidencePacket> = packets
            .iter()
            .map(|p| (p.chunk.id.as_str(), p))
            .collect();
        let (citations, dropped): (Vec<Citation>, Vec<Citation>) = citations
            .into_iter()
            .partition(|c| known.contains_key(c.chunk_id.as_str()));
        let dropped: Vec<String> = dropped
            .into_iter()
            .map(|c| c.chunk_id.as_str().to_string())
            .collect();
        if !dropped.is_empty() {
            issues.push(format!("dropped_unknown_citations:{}", dropped.len()));
        }

        // Citation enforcement: an answer without citations cannot stand.
        if citations.is_empty() {
            issues.push("citations_empty".to_string());
            return GuardrailReport {
                verdict: GuardrailVerdict::FailClosed,
                issues,
                citations,
                dropped,
            };
        }

        let cited_texts: Vec<&str> = citations
            .iter()
            .filter_map(|c| known.get(c.chunk_id.as_str()))
            .map(|p| p.chunk.text_ar.as_str())
            .collect();

        // Must-cite coverage.
        let mut uncovered = 0usize;
        for sentence in must_cite_sentences(answer_ar) {
            let covered = cited_texts.iter().any(|text| {
                let resolution = self.resolver.resolve_sentence(&sentence, text);
                resolution.status != ResolutionStatus::Unresolved
            });
            if !covered {
                uncovered += 1;
            }
        }
        if uncovered > 0 {
            issues.push(format!("uncovered_must_cite_sentences:{uncovered}"));
        }

        // Claim-to-evidence term coverage over all cited text.
        let combined = normalize_for_matching(&cited_texts.join(" "));
        let terms: Vec<String> = extract_keywords(answer_ar)
            .into_iter()
            .filter(|t| t.chars().count() >= 3)
            .collect();
        if !terms.is_empty() {
            let covered = terms.iter().filter(|t| combined.contains(t.as_str())).count();
            let ratio = covered as f64 / terms.len() as f64;
            if ratio < self.min_term_coverage {
                issues.push(format!("term_coverage_below_threshold:{ratio:.2}"));
            }
            if covered == 0 {
                issues.push("no_answer_term_in_evidence".to_string());
            }
        }

        let verdict = if uncovered > 0 && intent.is_definitional() {
            GuardrailVerdict::FailClosed
        } else if issues.is_empty() {
            GuardrailVerdict::Pass
        } else {
            GuardrailVerdict::Degrade
        };

        GuardrailReport {
            verdict,
            issues,
            citations,
            dropped,
        }
    }
}

/// Sentences of the answer that carry a factual-claim marker.
pub fn must_cite_sentences(answer_ar: &str) -> Vec<String> {
    split_sentences(answer_ar)
        .into_iter()
        .filter(|s| is_must_cite(s))
        .collect()
}

fn is_must_cite(sentence: &str) -> bool {
    let normalized = normalize_for_matching(sentence);
    let tokens: HashSet<&str> = normalized.split_whitespace().collect();

    DEFINITION_MARKERS.iter().any(|m| tokens.contains(m))
        || QUANTIFIER_MARKERS.iter().any(|m| tokens.contains(m))
        || SCRIPTURE_MARKERS
            .iter()
            .any(|m| normalized.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Chunk, ChunkKind, EntityKind, HitSource};

    fn packet(id: &str, text: &str) -> EvidencePacket {
        EvidencePacket {
            chunk: Chunk::new(
                id,
                "cv_tazkiya",
                EntityKind::CoreValue,
                ChunkKind::Definition,
                text,
                "anchor",
            ),
            sources: vec![HitSource::EntityExact],
            score: 3.0,
            vector_rank: None,
            edge: None,
        }
    }

    fn citation(id: &str) -> Citation {
        Citation::unresolved(id, "anchor")
    }

    const DEF: &str = "التزكية هي تطهير النفس من أدرانها وتنميتها بالطاعات.";

    #[test]
    fn detects_definition_and_scripture_markers() {
        let sentences = must_cite_sentences(
            "التزكية هي تطهير النفس. قال تعالى قد أفلح من زكاها. هذا كلام عام",
        );
        assert_eq!(sentences.len(), 2);
    }

    #[test]
    fn covered_answer_passes() {
        let guardrails = Guardrails::default();
        let report = guardrails.validate(
            DEF,
            vec![citation("ch1")],
            &[packet("ch1", DEF)],
            IntentKind::Definition,
            false,
        );
        assert_eq!(report.verdict, GuardrailVerdict::Pass);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn unknown_citation_ids_are_dropped() {
        let guardrails = Guardrails::default();
        let report = guardrails.validate(
            DEF,
            vec![citation("ch1"), citation("ghost")],
            &[packet("ch1", DEF)],
            IntentKind::PracticalGuidance,
            false,
        );
        assert_eq!(report.citations.len(), 1);
        assert_eq!(report.dropped, vec!["ghost".to_string()]);
    }

    #[test]
    fn dropping_all_citations_fails_closed() {
        let guardrails = Guardrails::default();
        let report = guardrails.validate(
            DEF,
            vec![citation("ghost")],
            &[packet("ch1", DEF)],
            IntentKind::PracticalGuidance,
            false,
        );
        assert_eq!(report.verdict, GuardrailVerdict::FailClosed);
        assert!(report.citations.is_empty());
    }

    #[test]
    fn uncovered_definitional_claim_fails_closed() {
        let guardrails = Guardrails::default();
        // The answer claims a definition the cited chunk does not contain.
        let report = guardrails.validate(
            "المراقبة هي دوام استشعار اطلاع الله على العبد.",
            vec![citation("ch1")],
            &[packet("ch1", DEF)],
            IntentKind::Definition,
            false,
        );
        assert_eq!(report.verdict, GuardrailVerdict::FailClosed);
    }

    #[test]
    fn uncovered_non_definitional_claim_degrades() {
        let guardrails = Guardrails::default();
        let report = guardrails.validate(
            "المراقبة هي دوام استشعار اطلاع الله على العبد.",
            vec![citation("ch1")],
            &[packet("ch1", DEF)],
            IntentKind::PracticalGuidance,
            false,
        );
        assert_eq!(report.verdict, GuardrailVerdict::Degrade);
    }

    #[test]
    fn refusals_skip_all_checks() {
        let guardrails = Guardrails::default();
        let report = guardrails.validate(
            "لا يوجد في البيانات ما يدعم الإجابة.",
            vec![],
            &[],
            IntentKind::Ambiguous,
            true,
        );
        assert_eq!(report.verdict, GuardrailVerdict::Pass);
    }
}
