//! FINALIZE: invariant enforcement and fail-closed substitution.
//!
//! Validates the assembled response against the schema invariants and
//! converts any violation into a safe refusal instead of an error. The
//! enforcement function is idempotent: feeding a finalized response
//! through again yields the same record.

use crate::pipeline::context::Abstention;
use crate::schema::{
    AbstainReason, Citation, Confidence, ContractOutcome, Difficulty, FinalResponse, Purpose,
};
use std::collections::HashSet;

/// Generic refusal text used for fail-closed substitutions.
pub const GENERIC_REFUSAL_AR: &str =
    "لا يوجد في البيانات الحالية ما يدعم الإجابة على هذا السؤال.";

/// Outcome for an abstention cause: honest policy refusals are partial
/// passes, system faults are failures.
pub fn outcome_for(reason: AbstainReason) -> ContractOutcome {
    match reason {
        AbstainReason::InsufficientEvidence | AbstainReason::OutOfScope => {
            ContractOutcome::PassPartial
        }
        AbstainReason::InputMalformed
        | AbstainReason::RetrievalUnavailable
        | AbstainReason::ModelUnavailable
        | AbstainReason::GuardrailFailure
        | AbstainReason::DeadlineExceeded => ContractOutcome::Fail,
    }
}

/// Build a refusal response from an abstention raised mid-pipeline.
pub fn refusal_response(
    abstention: &Abstention,
    listen_summary_ar: String,
    purpose: Purpose,
    path_plan_ar: Vec<String>,
    difficulty: Difficulty,
    entities: Vec<crate::schema::EntityRef>,
) -> FinalResponse {
    FinalResponse {
        listen_summary_ar,
        purpose: purpose.ensure_mandatory(),
        path_plan_ar,
        answer_ar: abstention.message_ar.clone(),
        citations: Vec::new(),
        entities,
        difficulty,
        not_found: true,
        confidence: Confidence::Low,
        contract_outcome: abstention.outcome,
        contract_reasons: abstention.contract_reasons.clone(),
        abstain_reason: Some(abstention.reason),
        refusal_suggestion_ar: abstention.suggestion_ar.clone(),
        argument_chains: Vec::new(),
    }
}

/// Enforce the response invariants, substituting fail-closed where they
/// do not hold. `valid_chunk_ids` is the set of chunk ids retrieved for
/// this request.
pub fn enforce_invariants(
    mut response: FinalResponse,
    valid_chunk_ids: &HashSet<String>,
) -> FinalResponse {
    // Invariant: mandatory constraints are always present.
    response.purpose = response.purpose.ensure_mandatory();

    // Invariant: every citation's chunk id was retrieved this request.
    let before = response.citations.len();
    response.citations = response
        .citations
        .into_iter()
        .filter(|c: &Citation| valid_chunk_ids.contains(c.chunk_id.as_str()))
        .collect();
    if response.citations.len() < before {
        push_reason(&mut response, "finalize_dropped_unknown_citations");
    }

    // Invariant: a successful answer carries at least one citation.
    if !response.not_found && response.citations.is_empty() {
        response.not_found = true;
        response.answer_ar = GENERIC_REFUSAL_AR.to_string();
        response.confidence = Confidence::Low;
        if response.abstain_reason.is_none() {
            response.abstain_reason = Some(AbstainReason::GuardrailFailure);
        }
        push_reason(&mut response, "finalize_missing_citations");
    }

    // Invariant: an abstention has empty citations, no chains, and a
    // populated abstain reason.
    if response.not_found {
        response.citations.clear();
        response.argument_chains.clear();
        if response.abstain_reason.is_none() {
            response.abstain_reason = Some(AbstainReason::InsufficientEvidence);
        }
        let coherent = outcome_for(response.abstain_reason.unwrap());
        if response.contract_outcome == ContractOutcome::PassFull {
            response.contract_outcome = coherent;
        }
    } else {
        // A delivered answer is not an abstention.
        response.abstain_reason = None;
        response.refusal_suggestion_ar = None;
    }

    response
}

fn push_reason(response: &mut FinalResponse, code: &str) {
    if !response.contract_reasons.iter().any(|r| r == code) {
        response.contract_reasons.push(code.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ResolutionMethod, ResolutionStatus, MANDATORY_CONSTRAINTS};

    fn base_response() -> FinalResponse {
        FinalResponse {
            listen_summary_ar: "السؤال عن: التزكية".to_string(),
            purpose: Purpose {
                goal_ar: "بيان التزكية".to_string(),
                constraints: vec![],
            },
            path_plan_ar: vec!["خطوة".to_string()],
            answer_ar: "التزكية هي تطهير النفس.".to_string(),
            citations: vec![Citation {
                chunk_id: "ch1".into(),
                source_anchor: "a1".to_string(),
                reference: None,
                status: ResolutionStatus::Resolved,
                method: ResolutionMethod::ExactSubstring,
            }],
            entities: vec![],
            difficulty: Difficulty::Medium,
            not_found: false,
            confidence: Confidence::High,
            contract_outcome: ContractOutcome::PassFull,
            contract_reasons: vec![],
            abstain_reason: None,
            refusal_suggestion_ar: None,
            argument_chains: vec![],
        }
    }

    fn ids(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn valid_response_passes_through() {
        let out = enforce_invariants(base_response(), &ids(&["ch1"]));
        assert!(!out.not_found);
        assert_eq!(out.citations.len(), 1);
        for c in MANDATORY_CONSTRAINTS {
            assert!(out.purpose.constraints.iter().any(|x| x == c));
        }
    }

    #[test]
    fn unknown_citation_is_dropped_and_forces_refusal_when_empty() {
        let out = enforce_invariants(base_response(), &ids(&["other"]));
        assert!(out.not_found);
        assert!(out.citations.is_empty());
        assert_eq!(out.answer_ar, GENERIC_REFUSAL_AR);
        assert!(out.abstain_reason.is_some());
        assert!(out
            .contract_reasons
            .iter()
            .any(|r| r == "finalize_missing_citations"));
    }

    #[test]
    fn abstention_gets_reason_and_clean_citations() {
        let mut response = base_response();
        response.not_found = true;
        let out = enforce_invariants(response, &ids(&["ch1"]));
        assert!(out.citations.is_empty());
        assert_eq!(out.abstain_reason, Some(AbstainReason::InsufficientEvidence));
        assert_ne!(out.contract_outcome, ContractOutcome::PassFull);
    }

    #[test]
    fn finalize_is_idempotent() {
        for start in [base_response(), {
            let mut r = base_response();
            r.citations.clear();
            r
        }] {
            let once = enforce_invariants(start, &ids(&["ch1"]));
            let twice = enforce_invariants(once.clone(), &ids(&["ch1"]));
            assert_eq!(
                serde_json::to_value(&once).unwrap(),
                serde_json::to_value(&twice).unwrap()
            );
        }
    }
}
