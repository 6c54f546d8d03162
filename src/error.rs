//! Engine-level error taxonomy.
//!
//! Transient collaborator failures never cross the pipeline boundary: they
//! are mapped to one of these kinds and handled locally, ending in a safe
//! refusal rather than a propagated error.

use crate::schema::AbstainReason;
use thiserror::Error;

/// Errors the pipeline can classify. Each maps to an abstain reason carried
/// in the final response.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("malformed input: {0}")]
    InputMalformed(String),

    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("insufficient evidence: {0}")]
    InsufficientEvidence(String),

    #[error("out of scope: {0}")]
    OutOfScope(String),

    #[error("guardrail failure: {0}")]
    GuardrailFailure(String),

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl EngineError {
    pub fn abstain_reason(&self) -> AbstainReason {
        match self {
            EngineError::InputMalformed(_) => AbstainReason::InputMalformed,
            EngineError::RetrievalUnavailable(_) => AbstainReason::RetrievalUnavailable,
            EngineError::ModelUnavailable(_) => AbstainReason::ModelUnavailable,
            EngineError::InsufficientEvidence(_) => AbstainReason::InsufficientEvidence,
            EngineError::OutOfScope(_) => AbstainReason::OutOfScope,
            EngineError::GuardrailFailure(_) => AbstainReason::GuardrailFailure,
            EngineError::DeadlineExceeded => AbstainReason::DeadlineExceeded,
        }
    }

    /// Machine-readable reason code for `contract_reasons`.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::InputMalformed(_) => "input_malformed",
            EngineError::RetrievalUnavailable(_) => "retrieval_unavailable",
            EngineError::ModelUnavailable(_) => "model_unavailable",
            EngineError::InsufficientEvidence(_) => "insufficient_evidence",
            EngineError::OutOfScope(_) => "out_of_scope",
            EngineError::GuardrailFailure(_) => "guardrail_failure",
            EngineError::DeadlineExceeded => "deadline_exceeded",
        }
    }
}
