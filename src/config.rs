//! Engine configuration.
//!
//! The full option table from the external contract, with the documented
//! defaults. Options can be set programmatically via the builder methods or
//! read from `MUHASIBI_*` environment variables.

use crate::schema::Mode;
use std::time::Duration;

/// Merge weights for the hybrid retriever. Entity-exact hits are strictly
/// dominant regardless of these values (the merge sorts entity hits first);
/// the weights shape ordering within each tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeWeights {
    pub entity: f64,
    pub vector: f64,
    pub graph: f64,
}

impl Default for MergeWeights {
    fn default() -> Self {
        Self {
            entity: 3.0,
            vector: 1.0,
            graph: 1.0,
        }
    }
}

/// Retrieval options.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Direct evidence chunks fetched per detected entity.
    pub entity_topk: usize,
    /// Vector-nearest chunks fetched per query.
    pub vector_topk: usize,
    /// Graph expansion depth.
    pub graph_depth: usize,
    /// Distinct vector hits below which query rewriting triggers.
    pub rewrite_threshold: usize,
    pub weights: MergeWeights,
    /// Cap on merged evidence packets per request.
    pub max_packets: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            entity_topk: 5,
            vector_topk: 10,
            graph_depth: 2,
            rewrite_threshold: 3,
            weights: MergeWeights::default(),
            max_packets: 10,
        }
    }
}

/// ACCOUNT gate options.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Minimum number of question keywords that must appear in the
    /// retrieved evidence.
    pub min_keyword_match: usize,
    /// Fiqh-ruling markers. A question containing one of these AND a
    /// worship term is refused as out of scope.
    pub fiqh_markers: Vec<String>,
    pub worship_terms: Vec<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            min_keyword_match: 1,
            fiqh_markers: [
                "ما حكم", "حكم", "يجوز", "لا يجوز", "حلال", "حرام", "مباح", "مكروه", "سنة",
                "فرض", "واجب", "مندوب", "بدعة",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            worship_terms: ["صيام", "صوم", "صلاة", "زكاة", "حج", "عمرة", "الجمعة"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Per-call and total deadlines.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub retrieval: Duration,
    pub model: Duration,
    pub total: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            retrieval: Duration::from_millis(2_000),
            model: Duration::from_millis(20_000),
            total: Duration::from_millis(30_000),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub retrieval: RetrievalConfig,
    pub account: AccountConfig,
    pub timeouts: Timeouts,
    pub default_mode: Mode,
    /// Present for the external option table; the core treats the hybrid
    /// retriever's ordering as authoritative and ignores this flag.
    pub reranker_enabled: bool,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `MUHASIBI_*` environment variables. Unset or
    /// unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_ENTITY_TOPK") {
            config.retrieval.entity_topk = v;
        }
        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_VECTOR_TOPK") {
            config.retrieval.vector_topk = v;
        }
        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_GRAPH_DEPTH") {
            config.retrieval.graph_depth = v;
        }
        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_REWRITE_THRESHOLD") {
            config.retrieval.rewrite_threshold = v;
        }
        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_MAX_PACKETS") {
            config.retrieval.max_packets = v;
        }
        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_WEIGHT_ENTITY") {
            config.retrieval.weights.entity = v;
        }
        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_WEIGHT_VECTOR") {
            config.retrieval.weights.vector = v;
        }
        if let Some(v) = env_parse("MUHASIBI_RETRIEVAL_WEIGHT_GRAPH") {
            config.retrieval.weights.graph = v;
        }
        if let Some(v) = env_parse("MUHASIBI_ACCOUNT_MIN_KEYWORD_MATCH") {
            config.account.min_keyword_match = v;
        }
        if let Some(v) = env_parse::<u64>("MUHASIBI_TIMEOUT_RETRIEVAL_MS") {
            config.timeouts.retrieval = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("MUHASIBI_TIMEOUT_MODEL_MS") {
            config.timeouts.model = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("MUHASIBI_TIMEOUT_TOTAL_MS") {
            config.timeouts.total = Duration::from_millis(v);
        }
        if let Ok(v) = std::env::var("MUHASIBI_MODE_DEFAULT") {
            if let Ok(mode) = v.parse() {
                config.default_mode = mode;
            }
        }
        if let Ok(v) = std::env::var("MUHASIBI_RERANKER_ENABLED") {
            config.reranker_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }

        config
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_max_packets(mut self, max_packets: usize) -> Self {
        self.retrieval.max_packets = max_packets;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}
