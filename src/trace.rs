//! State-transition audit trace.
//!
//! Each stage records one snapshot: counts, elapsed time, and short issue
//! codes. Chunk contents, prompt text, and model internals are excluded by
//! construction; nothing in these records can carry them. Rendering a
//! trace is a pure function over the records.

use crate::schema::{Confidence, Mode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage names, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageName {
    Listen,
    Purpose,
    Path,
    Retrieve,
    Account,
    Interpret,
    Reflect,
    Finalize,
}

impl StageName {
    pub const ORDER: [StageName; 8] = [
        StageName::Listen,
        StageName::Purpose,
        StageName::Path,
        StageName::Retrieve,
        StageName::Account,
        StageName::Interpret,
        StageName::Reflect,
        StageName::Finalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Listen => "LISTEN",
            StageName::Purpose => "PURPOSE",
            StageName::Path => "PATH",
            StageName::Retrieve => "RETRIEVE",
            StageName::Account => "ACCOUNT",
            StageName::Interpret => "INTERPRET",
            StageName::Reflect => "REFLECT",
            StageName::Finalize => "FINALIZE",
        }
    }
}

/// Allowed per-state counters. Only counts and flags; never content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

/// One per-state trace record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTrace {
    pub state: StageName,
    pub mode: Mode,
    pub language: String,
    pub elapsed_s: f64,
    pub counts: TraceCounts,
    pub issues: Vec<String>,
}

/// The full trace of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceBundle {
    pub request_id: Uuid,
    pub states: Vec<StateTrace>,
}

impl TraceBundle {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            states: Vec::new(),
        }
    }

    /// Append a state record. Stage order in the bundle is append order;
    /// the orchestrator appends strictly in pipeline order.
    pub fn record(
        &mut self,
        state: StageName,
        mode: Mode,
        language: &str,
        elapsed_s: f64,
        counts: TraceCounts,
        issues: Vec<String>,
    ) {
        self.states.push(StateTrace {
            state,
            mode,
            language: language.to_string(),
            elapsed_s,
            counts,
            issues,
        });
    }

    /// Whether the recorded stages follow the canonical order. Refusals
    /// jump forward (ACCOUNT straight to FINALIZE), so the sequence must
    /// be a strictly increasing subsequence of the canonical order,
    /// starting at LISTEN.
    pub fn is_order_valid(&self) -> bool {
        let index = |s: StageName| StageName::ORDER.iter().position(|o| *o == s).unwrap();
        if let Some(first) = self.states.first() {
            if first.state != StageName::Listen {
                return false;
            }
        }
        self.states
            .windows(2)
            .all(|w| index(w[0].state) < index(w[1].state))
    }
}

/// Render a trace bundle to JSON. Pure: identical input yields identical
/// output.
pub fn render_trace(bundle: &TraceBundle) -> serde_json::Value {
    serde_json::to_value(bundle).unwrap_or(serde_json::Value::Null)
}
