//! Per-request context and stage outputs.
//!
//! Each stage receives the immutable inputs it needs and returns only its
//! own output; the orchestrator merges outputs into the context. Every
//! field is written once, by its owning stage.

use crate::resolver::EntityMatch;
use crate::schema::{
    AbstainReason, ArgumentChain, Citation, Confidence, ContractOutcome, Difficulty, EntityRef,
    Intent, Mode, Purpose,
};
use uuid::Uuid;

pub use crate::retrieve::RetrievalOutcome;

/// LISTEN output.
#[derive(Debug, Clone)]
pub struct ListenOutput {
    pub normalized_question: String,
    pub listen_summary_ar: String,
    pub keywords: Vec<String>,
    pub entities: Vec<EntityMatch>,
    pub intent: Intent,
}

/// PURPOSE output. The model may volunteer a plan, which PATH adopts.
#[derive(Debug, Clone)]
pub struct PurposeOutput {
    pub purpose: Purpose,
    pub model_plan: Option<Vec<String>>,
    /// True when the model call failed and the goal was synthesized.
    pub fallback: bool,
}

/// PATH output.
#[derive(Debug, Clone)]
pub struct PathOutput {
    pub plan_ar: Vec<String>,
    pub difficulty: Difficulty,
}

/// ACCOUNT decision.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountDecision {
    /// Evidence passes the gate; proceed to INTERPRET.
    Sufficient,
    /// Existence or relevance failed; refuse.
    InsufficientRefuse,
    /// Fiqh, biography or other out-of-scope question; refuse, with an
    /// optional in-scope reframing.
    OutOfScopeRefuse { suggestion_ar: Option<String> },
}

/// ACCOUNT output.
#[derive(Debug, Clone)]
pub struct AccountOutput {
    pub decision: AccountDecision,
    pub issues: Vec<String>,
    pub reasons: Vec<String>,
}

/// INTERPRET output (also produced by the structural and fallback paths).
#[derive(Debug, Clone)]
pub struct InterpretedAnswer {
    pub answer_ar: String,
    pub citations: Vec<Citation>,
    pub entities: Vec<EntityRef>,
    pub not_found: bool,
    pub confidence: Confidence,
    pub argument_chains: Vec<ArgumentChain>,
    /// PASS_FULL unless guardrails degraded the answer.
    pub outcome_hint: ContractOutcome,
    pub reasons: Vec<String>,
    pub abstain_reason: Option<AbstainReason>,
}

/// REFLECT output.
#[derive(Debug, Clone)]
pub struct ReflectOutput {
    pub answer_ar: String,
    pub annotation_added: bool,
}

/// A structured abstention raised by a stage.
#[derive(Debug, Clone)]
pub struct Abstention {
    pub reason: AbstainReason,
    pub message_ar: String,
    pub suggestion_ar: Option<String>,
    pub contract_reasons: Vec<String>,
    /// FAIL for system faults, PASS_PARTIAL for honest policy refusals.
    pub outcome: ContractOutcome,
}

impl Abstention {
    pub fn fail(reason: AbstainReason, message_ar: impl Into<String>, code: &str) -> Self {
        Self {
            reason,
            message_ar: message_ar.into(),
            suggestion_ar: None,
            contract_reasons: vec![code.to_string()],
            outcome: ContractOutcome::Fail,
        }
    }

    pub fn refuse(reason: AbstainReason, message_ar: impl Into<String>, code: &str) -> Self {
        Self {
            reason,
            message_ar: message_ar.into(),
            suggestion_ar: None,
            contract_reasons: vec![code.to_string()],
            outcome: ContractOutcome::PassPartial,
        }
    }

    pub fn with_suggestion(mut self, suggestion_ar: impl Into<String>) -> Self {
        self.suggestion_ar = Some(suggestion_ar.into());
        self
    }
}

/// Result variant each stage returns to the orchestrator.
#[derive(Debug, Clone)]
pub enum StageResult<T> {
    Proceed(T),
    Abstain(Abstention),
}

/// The shared, growing request record. Downstream stages depend only on
/// fields produced by prior stages; no stage reaches backward.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub question: String,
    pub language: String,
    pub mode: Mode,

    pub listen: Option<ListenOutput>,
    pub purpose: Option<PurposeOutput>,
    pub path: Option<PathOutput>,
    pub retrieval: Option<RetrievalOutcome>,
    pub account: Option<AccountOutput>,
    pub interpret: Option<InterpretedAnswer>,
    pub reflect: Option<ReflectOutput>,
}

impl RequestContext {
    pub fn new(question: impl Into<String>, language: impl Into<String>, mode: Mode) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            question: question.into(),
            language: language.into(),
            mode,
            listen: None,
            purpose: None,
            path: None,
            retrieval: None,
            account: None,
            interpret: None,
            reflect: None,
        }
    }

    pub fn listen(&self) -> &ListenOutput {
        self.listen.as_ref().expect("LISTEN ran before this stage")
    }

    pub fn packets(&self) -> &[crate::schema::EvidencePacket] {
        self.retrieval
            .as_ref()
            .map(|r| r.packets.as_slice())
            .unwrap_or(&[])
    }
}
