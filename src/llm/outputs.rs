//! Structured model inputs and outputs.
//!
//! Every model call declares a strict JSON schema derived from these
//! types. A response that fails to deserialize against its schema is a
//! model failure, never a partial result.

use crate::schema::{Confidence, Difficulty, EvidencePacket, IntentKind, Mode};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// JSON schema for a structured output type, as handed to the provider.
pub fn output_schema<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(serde_json::Value::Null)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Input to the purpose/path call.
#[derive(Debug, Clone, Serialize)]
pub struct PurposePathRequest {
    pub question: String,
    /// Arabic names of the detected entities.
    pub entities: Vec<String>,
    pub keywords: Vec<String>,
}

/// Input to the query-rewrite call.
#[derive(Debug, Clone, Serialize)]
pub struct RewriteRequest {
    pub question: String,
    pub entities: Vec<String>,
    pub keywords: Vec<String>,
}

/// Input to the intent-classification call.
#[derive(Debug, Clone, Serialize)]
pub struct IntentRequest {
    pub question: String,
    pub entities: Vec<String>,
    pub keywords: Vec<String>,
}

/// Input to the interpretation call. Only the evidence packets are
/// available to the model; it must refuse rather than reach beyond them.
#[derive(Debug, Clone, Serialize)]
pub struct InterpretRequest {
    pub question: String,
    pub evidence_packets: Vec<EvidencePacket>,
    pub entities: Vec<String>,
    pub mode: Mode,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Goal, constraints, plan and difficulty from the purpose/path call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PurposePathOutput {
    pub goal_ar: String,
    pub constraints: Vec<String>,
    pub path_plan_ar: Vec<String>,
    pub difficulty: Difficulty,
}

/// Up to five Arabic search rewrites plus an optional disambiguation
/// question. The model must not answer here; there are no free-form
/// fields besides the rewrites.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RewriteOutput {
    pub rewrites_ar: Vec<String>,
    pub disambiguation_ar: Option<String>,
}

/// Intent classification result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IntentOutput {
    pub intent_type: IntentKind,
    pub in_scope: bool,
    pub confidence: f64,
    #[serde(default)]
    pub target_entity: Option<String>,
    #[serde(default)]
    pub suggested_queries_ar: Vec<String>,
    #[serde(default)]
    pub clarification_ar: Option<String>,
}

/// A citation as emitted by the model, before hydration and span
/// resolution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ModelCitation {
    pub chunk_id: String,
    pub source_anchor: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Evidence-bound answer from the interpretation call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InterpretOutput {
    pub answer_ar: String,
    pub citations: Vec<ModelCitation>,
    /// Arabic names of entities the answer touches.
    pub entities: Vec<String>,
    pub not_found: bool,
    pub confidence: Confidence,
}
