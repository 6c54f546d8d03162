//! Muhasibi: evidence-only Arabic question answering.
//!
//! An 8-stage deterministic pipeline (LISTEN, PURPOSE, PATH, RETRIEVE,
//! ACCOUNT, INTERPRET, REFLECT, FINALIZE) over a closed wellbeing
//! knowledge framework. Every factual sentence in a response is backed by
//! a retrieved chunk from the canonical corpus; when evidence is missing
//! or the question is out of scope, the engine refuses with a structured
//! abstention.
//!
//! # Core pieces
//!
//! - **Catalog**: immutable snapshot of the Pillar, Core-Value, Sub-Value
//!   hierarchy and its justified graph edges
//! - **Hybrid retrieval**: entity-exact, vector-nearest and graph-expand
//!   legs merged deterministically
//! - **Guardrails**: citation coverage, span resolution and fail-closed
//!   refusal
//!
//! # Example
//!
//! ```no_run
//! use muhasibi::{AskRequest, Engine, EngineConfig, SqliteStore};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let store = Arc::new(SqliteStore::open("framework.db").unwrap());
//! let catalog = Arc::new(store.load_catalog().unwrap());
//! let engine = Engine::new(catalog, store, None, EngineConfig::from_env());
//! let answer = engine.ask(AskRequest::new("ما هي ركائز الحياة الطيبة الخمس؟")).await;
//! # }
//! ```

pub mod api;
pub mod arabic;
pub mod catalog;
pub mod chains;
pub mod config;
pub mod error;
pub mod guardrails;
pub mod llm;
pub mod pipeline;
pub mod resolver;
pub mod retrieve;
pub mod schema;
pub mod spans;
pub mod storage;
pub mod trace;

pub use api::{AskRequest, AskResponse, Engine};
pub use catalog::EntityCatalog;
pub use config::EngineConfig;
pub use error::EngineError;
pub use llm::{MockModelClient, ModelClient, ModelError};
pub use resolver::EntityResolver;
pub use retrieve::{Embedder, EvidenceStore, HybridRetriever, RetrievalError};
pub use schema::{
    AbstainReason, ArgumentChain, Chunk, ChunkId, ChunkKind, Citation, Confidence,
    ContractOutcome, Difficulty, Edge, EdgeId, EdgeStatus, Entity, EntityId, EntityKind,
    EvidencePacket, FinalResponse, Intent, IntentKind, JustificationSpan, Mode, Purpose,
    RelationLabel, ScriptureKind,
};
pub use storage::{RunStore, SqliteStore, StorageError};
pub use trace::{StateTrace, TraceBundle};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
