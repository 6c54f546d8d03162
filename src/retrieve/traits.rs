//! Retrieval store contract.
//!
//! The engine consumes evidence through this trait; the concrete store
//! (SQLite here, anything network-backed elsewhere) must be safe for
//! concurrent calls. All methods are suspension points.

use crate::schema::{Chunk, ChunkId, EdgeId, EdgeProvenance, Entity, EntityId, JustificationSpan};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from retrieval operations.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// Result type for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// A chunk surfaced by graph expansion, with the edge that led to it.
#[derive(Debug, Clone)]
pub struct GraphHit {
    pub chunk: Chunk,
    pub edge: EdgeProvenance,
}

/// Evidence access contract.
///
/// Implementations must be `Send + Sync`; the engine issues the three
/// retrieval legs concurrently within a request.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Resolve keywords to catalog entities (collaborator-facing; the
    /// pipeline itself resolves against its in-memory snapshot).
    async fn resolve_entities(&self, keywords: &[String]) -> RetrievalResult<Vec<Entity>>;

    /// Definition and evidence chunks attached directly to an entity.
    /// Definition chunks sort first, then evidence, then commentary,
    /// id-ordered within each kind.
    async fn lookup_by_entity(
        &self,
        entity_id: &EntityId,
        limit: usize,
    ) -> RetrievalResult<Vec<Chunk>>;

    /// Nearest chunks to the query text by embedding cosine, best first.
    async fn vector_search(&self, text: &str, limit: usize)
        -> RetrievalResult<Vec<(Chunk, f32)>>;

    /// Expand the graph from the given entities up to `depth` hops.
    ///
    /// Only approved edges carrying at least one justification span are
    /// traversed. Emits the target entity's definition chunk and the
    /// justification-span chunks of each traversed edge.
    async fn expand_graph(
        &self,
        entity_ids: &[EntityId],
        depth: usize,
    ) -> RetrievalResult<Vec<GraphHit>>;

    async fn get_chunk(&self, chunk_id: &ChunkId) -> RetrievalResult<Option<Chunk>>;

    /// Justification spans for an edge.
    async fn get_edge_evidence(&self, edge_id: &EdgeId)
        -> RetrievalResult<Vec<JustificationSpan>>;
}
