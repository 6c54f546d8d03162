//! Core data contracts for the Muḥāsibī pipeline.
//!
//! These types are the authoritative wire and storage contracts: the entity
//! hierarchy, evidence chunks, graph edges with justification spans, the
//! per-request evidence packets, citations, and the final response schema.
//! The catalog side (entities, chunks, edges) is read-only to the engine;
//! packets and responses live for a single request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Stable identifier of a framework entity (pillar, core value, sub-value).
    EntityId
);
string_id!(
    /// Stable identifier of an evidence chunk.
    ChunkId
);
string_id!(
    /// Stable identifier of a graph edge.
    EdgeId
);

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// The three-level hierarchy of the wellbeing framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Pillar,
    CoreValue,
    SubValue,
}

impl EntityKind {
    /// Hierarchy depth. Sub-values are the most specific level and win
    /// tie-breaks during entity resolution.
    pub fn depth(&self) -> u8 {
        match self {
            EntityKind::Pillar => 0,
            EntityKind::CoreValue => 1,
            EntityKind::SubValue => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Pillar => "pillar",
            EntityKind::CoreValue => "core_value",
            EntityKind::SubValue => "sub_value",
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pillar" => Ok(EntityKind::Pillar),
            "core_value" => Ok(EntityKind::CoreValue),
            "sub_value" => Ok(EntityKind::SubValue),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// A framework entity. Created by ingestion, read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name_ar: String,
    pub definition_ar: Option<String>,
    /// Parent in the hierarchy. None for pillars.
    pub parent: Option<EntityId>,
    pub source_anchor: String,
}

impl Entity {
    pub fn new(
        id: impl Into<EntityId>,
        kind: EntityKind,
        name_ar: impl Into<String>,
        source_anchor: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name_ar: name_ar.into(),
            definition_ar: None,
            parent: None,
            source_anchor: source_anchor.into(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<EntityId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_definition(mut self, definition_ar: impl Into<String>) -> Self {
        self.definition_ar = Some(definition_ar.into());
        self
    }
}

/// Entity reference carried in the final response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: EntityId,
    pub name_ar: String,
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Kinds of canonical text chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Definition,
    Evidence,
    Commentary,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Definition => "definition",
            ChunkKind::Evidence => "evidence",
            ChunkKind::Commentary => "commentary",
        }
    }
}

impl std::str::FromStr for ChunkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "definition" => Ok(ChunkKind::Definition),
            "evidence" => Ok(ChunkKind::Evidence),
            "commentary" => Ok(ChunkKind::Commentary),
            other => Err(format!("unknown chunk kind: {other}")),
        }
    }
}

/// Kinds of scriptural references attached to a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptureKind {
    Quran,
    Hadith,
    Book,
}

/// A parsed scriptural reference (e.g. a surah/ayah or hadith number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptureRef {
    pub kind: ScriptureKind,
    pub reference: String,
}

/// A canonical text chunk. Immutable after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub entity_id: EntityId,
    pub entity_kind: EntityKind,
    pub kind: ChunkKind,
    pub text_ar: String,
    pub source_anchor: String,
    #[serde(default)]
    pub refs: Vec<ScriptureRef>,
}

impl Chunk {
    pub fn new(
        id: impl Into<ChunkId>,
        entity_id: impl Into<EntityId>,
        entity_kind: EntityKind,
        kind: ChunkKind,
        text_ar: impl Into<String>,
        source_anchor: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            entity_kind,
            kind,
            text_ar: text_ar.into(),
            source_anchor: source_anchor.into(),
            refs: Vec::new(),
        }
    }

    pub fn with_ref(mut self, kind: ScriptureKind, reference: impl Into<String>) -> Self {
        self.refs.push(ScriptureRef {
            kind,
            reference: reference.into(),
        });
        self
    }
}

// ---------------------------------------------------------------------------
// Graph edges
// ---------------------------------------------------------------------------

/// Semantic relation labels between framework entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationLabel {
    Enables,
    Reinforces,
    ConditionalOn,
    TensionWith,
    ResolvesWith,
    ContrastsWith,
    Complements,
    Contains,
    SupportedBy,
}

impl RelationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationLabel::Enables => "ENABLES",
            RelationLabel::Reinforces => "REINFORCES",
            RelationLabel::ConditionalOn => "CONDITIONAL_ON",
            RelationLabel::TensionWith => "TENSION_WITH",
            RelationLabel::ResolvesWith => "RESOLVES_WITH",
            RelationLabel::ContrastsWith => "CONTRASTS_WITH",
            RelationLabel::Complements => "COMPLEMENTS",
            RelationLabel::Contains => "CONTAINS",
            RelationLabel::SupportedBy => "SUPPORTED_BY",
        }
    }

    /// Arabic rendering used in composed answers and argument chains.
    pub fn label_ar(&self) -> &'static str {
        match self {
            RelationLabel::Enables => "تمكين/إعانة",
            RelationLabel::Reinforces => "تعزيز",
            RelationLabel::ConditionalOn => "مشروط بـ",
            RelationLabel::TensionWith => "تعارض ظاهري",
            RelationLabel::ResolvesWith => "توفيق/ترجيح",
            RelationLabel::ContrastsWith => "مقابلة",
            RelationLabel::Complements => "تكامل",
            RelationLabel::Contains => "تضمين",
            RelationLabel::SupportedBy => "استناد",
        }
    }
}

impl std::str::FromStr for RelationLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENABLES" => Ok(RelationLabel::Enables),
            "REINFORCES" => Ok(RelationLabel::Reinforces),
            "CONDITIONAL_ON" => Ok(RelationLabel::ConditionalOn),
            "TENSION_WITH" => Ok(RelationLabel::TensionWith),
            "RESOLVES_WITH" => Ok(RelationLabel::ResolvesWith),
            "CONTRASTS_WITH" => Ok(RelationLabel::ContrastsWith),
            "COMPLEMENTS" => Ok(RelationLabel::Complements),
            "CONTAINS" => Ok(RelationLabel::Contains),
            "SUPPORTED_BY" => Ok(RelationLabel::SupportedBy),
            other => Err(format!("unknown relation label: {other}")),
        }
    }
}

/// Review status of a graph edge. Only approved edges reach retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Candidate,
    Approved,
    Rejected,
}

/// A verbatim quote anchoring an edge to the canonical text.
///
/// `start`/`end` are character offsets into the chunk text; `quote` is the
/// exact substring at that range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JustificationSpan {
    pub chunk_id: ChunkId,
    pub start: usize,
    pub end: usize,
    pub quote: String,
}

/// A typed, directed relation between two entities.
///
/// Invariant: an edge without at least one justification span is excluded
/// from retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: EntityId,
    pub target: EntityId,
    pub relation: RelationLabel,
    pub status: EdgeStatus,
    pub spans: Vec<JustificationSpan>,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<EntityId>,
        target: impl Into<EntityId>,
        relation: RelationLabel,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            relation,
            status: EdgeStatus::Candidate,
            spans: Vec::new(),
        }
    }

    pub fn approved(mut self) -> Self {
        self.status = EdgeStatus::Approved;
        self
    }

    pub fn with_span(
        mut self,
        chunk_id: impl Into<ChunkId>,
        start: usize,
        end: usize,
        quote: impl Into<String>,
    ) -> Self {
        self.spans.push(JustificationSpan {
            chunk_id: chunk_id.into(),
            start,
            end,
            quote: quote.into(),
        });
        self
    }

    /// Whether retrieval may traverse this edge.
    pub fn retrievable(&self) -> bool {
        self.status == EdgeStatus::Approved && !self.spans.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Evidence packets (request-scoped)
// ---------------------------------------------------------------------------

/// How a packet entered the evidence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    EntityExact,
    Vector,
    GraphExpand,
}

/// Edge provenance attached to a graph-expand packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeProvenance {
    pub edge_id: EdgeId,
    pub relation: RelationLabel,
    pub source: EntityId,
    pub target: EntityId,
    /// Justification quote that grounded the traversal.
    pub quote: String,
}

/// A chunk projection annotated with retrieval provenance. One request only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePacket {
    pub chunk: Chunk,
    /// All sources that surfaced this chunk, deduplicated.
    pub sources: Vec<HitSource>,
    pub score: f64,
    /// Rank within the vector result list, when vector-sourced (1-based).
    pub vector_rank: Option<usize>,
    /// Edge info, when graph-sourced.
    pub edge: Option<EdgeProvenance>,
}

impl EvidencePacket {
    pub fn chunk_id(&self) -> &ChunkId {
        &self.chunk.id
    }

    pub fn from_source(&self, source: HitSource) -> bool {
        self.sources.contains(&source)
    }

    pub fn is_definition(&self) -> bool {
        self.chunk.kind == ChunkKind::Definition
    }
}

// ---------------------------------------------------------------------------
// Citations
// ---------------------------------------------------------------------------

/// Outcome of locating an answer sentence inside a cited chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Approximate,
    Unresolved,
}

/// Method used for span resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    ExactSubstring,
    TokenOverlap,
    Fallback,
}

/// A citation in the final response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: ChunkId,
    pub source_anchor: String,
    #[serde(default)]
    pub reference: Option<String>,
    pub status: ResolutionStatus,
    pub method: ResolutionMethod,
}

impl Citation {
    /// A citation before span resolution has run.
    pub fn unresolved(chunk_id: impl Into<ChunkId>, source_anchor: impl Into<String>) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            source_anchor: source_anchor.into(),
            reference: None,
            status: ResolutionStatus::Unresolved,
            method: ResolutionMethod::Fallback,
        }
    }

    pub fn supported(&self) -> bool {
        matches!(
            self.status,
            ResolutionStatus::Resolved | ResolutionStatus::Approximate
        )
    }
}

// ---------------------------------------------------------------------------
// Argument chains
// ---------------------------------------------------------------------------

/// An edge-derived claim included in the final response.
///
/// Built only from graph-expand packets that the final answer actually
/// cites; the inference type is the edge's semantic relation label and the
/// claim is its justification quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentChain {
    pub edge_id: EdgeId,
    pub claim_ar: String,
    pub inference: RelationLabel,
    #[serde(default)]
    pub boundary_ar: Option<String>,
}

// ---------------------------------------------------------------------------
// Request surface
// ---------------------------------------------------------------------------

/// Answer modes. Each selects a prompt voice; the answer contract is the
/// same for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Answer,
    Debate,
    Socratic,
    Judge,
    NaturalChat,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Answer => "answer",
            Mode::Debate => "debate",
            Mode::Socratic => "socratic",
            Mode::Judge => "judge",
            Mode::NaturalChat => "natural_chat",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answer" => Ok(Mode::Answer),
            "debate" => Ok(Mode::Debate),
            "socratic" => Ok(Mode::Socratic),
            "judge" => Ok(Mode::Judge),
            "natural_chat" => Ok(Mode::NaturalChat),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// Classified question intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    ListPillars,
    ListCoreValues,
    ListSubValues,
    Definition,
    Comparison,
    ConnectAcrossPillars,
    PracticalGuidance,
    FiqhRuling,
    Biography,
    GeneralKnowledge,
    Ambiguous,
}

impl IntentKind {
    /// Intents answered by direct projection from the entity catalog.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            IntentKind::ListPillars | IntentKind::ListCoreValues | IntentKind::ListSubValues
        )
    }

    /// Intents where an unresolved must-cite sentence fails closed.
    pub fn is_definitional(&self) -> bool {
        matches!(self, IntentKind::Definition)
    }
}

/// Intent record produced by LISTEN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub in_scope: bool,
    pub confidence: f64,
    #[serde(default)]
    pub target_entity: Option<EntityId>,
}

impl Intent {
    pub fn ambiguous() -> Self {
        Self {
            kind: IntentKind::Ambiguous,
            in_scope: true,
            confidence: 0.0,
            target_entity: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Response schema
// ---------------------------------------------------------------------------

/// Confidence levels for answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Question difficulty, derived by PATH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// One level harder, saturating at hard.
    pub fn harder(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }
}

/// The three mandatory purpose constraints. Every request carries them.
pub const MANDATORY_CONSTRAINTS: [&str; 3] =
    ["evidence_only", "cite_every_claim", "refuse_if_missing"];

/// Goal plus constraint set derived by PURPOSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purpose {
    pub goal_ar: String,
    pub constraints: Vec<String>,
}

impl Purpose {
    /// Append any missing mandatory constraints, preserving order and
    /// deduplicating.
    pub fn ensure_mandatory(mut self) -> Self {
        for required in MANDATORY_CONSTRAINTS {
            if !self.constraints.iter().any(|c| c == required) {
                self.constraints.push(required.to_string());
            }
        }
        self
    }
}

/// Contract outcome emitted at FINALIZE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractOutcome {
    PassFull,
    PassPartial,
    Fail,
}

/// Machine-readable abstention causes (mirrors the error taxonomy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstainReason {
    InputMalformed,
    RetrievalUnavailable,
    ModelUnavailable,
    InsufficientEvidence,
    OutOfScope,
    GuardrailFailure,
    DeadlineExceeded,
}

/// The final response schema returned to every caller, refusals included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub listen_summary_ar: String,
    pub purpose: Purpose,
    pub path_plan_ar: Vec<String>,
    pub answer_ar: String,
    pub citations: Vec<Citation>,
    pub entities: Vec<EntityRef>,
    pub difficulty: Difficulty,
    pub not_found: bool,
    pub confidence: Confidence,
    pub contract_outcome: ContractOutcome,
    pub contract_reasons: Vec<String>,
    #[serde(default)]
    pub abstain_reason: Option<AbstainReason>,
    /// In-scope reframing offered with some refusals (fiqh questions).
    #[serde(default)]
    pub refusal_suggestion_ar: Option<String>,
    #[serde(default)]
    pub argument_chains: Vec<ArgumentChain>,
}

// ---------------------------------------------------------------------------
// Persistence records
// ---------------------------------------------------------------------------

/// User feedback on a completed request. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub request_id: uuid::Uuid,
    /// -1, 0 or +1.
    pub rating: i8,
    pub tags: Vec<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
