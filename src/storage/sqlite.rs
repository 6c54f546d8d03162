//! SQLite storage backend.
//!
//! One database holds the canonical snapshot (entities, chunks, edges,
//! justification spans, embeddings) and the append-only run/feedback log.
//! The snapshot tables are written by ingestion tooling and the seeding
//! helpers here; the engine only reads them. Embeddings are computed at
//! insert time through the configured `Embedder` so vector search needs no
//! external service.

use crate::arabic::normalize_for_matching;
use crate::catalog::EntityCatalog;
use crate::retrieve::{
    cosine_similarity, Embedder, EvidenceStore, GraphHit, HashedEmbedder, RetrievalError,
    RetrievalResult,
};
use crate::schema::{
    Chunk, ChunkId, ChunkKind, Edge, EdgeId, EdgeProvenance, EdgeStatus, Entity, EntityId,
    EntityKind, Feedback, JustificationSpan, RelationLabel, ScriptureRef,
};
use crate::storage::traits::{RunRecord, RunStore, StorageError, StorageResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed evidence store and run log.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteStore {
    /// Open or create a store at the given path, with the default
    /// deterministic embedder.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_embedder(path, Arc::new(HashedEmbedder::default()))
    }

    pub fn open_with_embedder(
        path: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
    ) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn, embedder)
    }

    /// In-memory store, used by tests and the demo seed.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn, Arc::new(HashedEmbedder::default()))
    }

    fn bootstrap(conn: Connection, embedder: Arc<dyn Embedder>) -> StorageResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entity (
                id            TEXT PRIMARY KEY,
                kind          TEXT NOT NULL,
                name_ar       TEXT NOT NULL,
                definition_ar TEXT,
                parent_id     TEXT,
                source_anchor TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunk (
                id            TEXT PRIMARY KEY,
                entity_id     TEXT NOT NULL,
                entity_kind   TEXT NOT NULL,
                kind          TEXT NOT NULL,
                text_ar       TEXT NOT NULL,
                source_anchor TEXT NOT NULL,
                refs          TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_chunk_entity ON chunk(entity_id, kind, id);

            CREATE TABLE IF NOT EXISTS edge (
                id        TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relation  TEXT NOT NULL,
                status    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_edge_source ON edge(source_id);

            CREATE TABLE IF NOT EXISTS edge_span (
                edge_id  TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                span_start INTEGER NOT NULL,
                span_end   INTEGER NOT NULL,
                quote    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_edge_span_edge ON edge_span(edge_id);

            CREATE TABLE IF NOT EXISTS embedding (
                chunk_id TEXT PRIMARY KEY,
                vector   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS run (
                request_id      TEXT PRIMARY KEY,
                created_at      TEXT NOT NULL,
                inputs          TEXT NOT NULL,
                response        TEXT NOT NULL,
                retrieval_trace TEXT NOT NULL,
                state_trace     TEXT NOT NULL,
                timings         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS feedback (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                rating     INTEGER NOT NULL,
                tags       TEXT NOT NULL,
                comment    TEXT
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    // --- Seeding (ingestion-facing writes) ---

    pub fn insert_entity(&self, entity: &Entity) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO entity (id, kind, name_ar, definition_ar, parent_id, source_anchor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entity.id.as_str(),
                entity.kind.as_str(),
                entity.name_ar,
                entity.definition_ar,
                entity.parent.as_ref().map(|p| p.as_str().to_string()),
                entity.source_anchor,
            ],
        )?;
        Ok(())
    }

    /// Insert a chunk and its embedding.
    pub fn insert_chunk(&self, chunk: &Chunk) -> StorageResult<()> {
        let vector = self
            .embedder
            .embed(&chunk.text_ar)
            .map_err(|e| StorageError::CorruptRecord(e.to_string()))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO chunk (id, entity_id, entity_kind, kind, text_ar, source_anchor, refs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                chunk.id.as_str(),
                chunk.entity_id.as_str(),
                chunk.entity_kind.as_str(),
                chunk.kind.as_str(),
                chunk.text_ar,
                chunk.source_anchor,
                serde_json::to_string(&chunk.refs)?,
            ],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO embedding (chunk_id, vector) VALUES (?1, ?2)",
            params![chunk.id.as_str(), serde_json::to_string(&vector)?],
        )?;
        Ok(())
    }

    pub fn insert_edge(&self, edge: &Edge) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO edge (id, source_id, target_id, relation, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                edge.id.as_str(),
                edge.source.as_str(),
                edge.target.as_str(),
                edge.relation.as_str(),
                match edge.status {
                    EdgeStatus::Candidate => "candidate",
                    EdgeStatus::Approved => "approved",
                    EdgeStatus::Rejected => "rejected",
                },
            ],
        )?;
        conn.execute(
            "DELETE FROM edge_span WHERE edge_id = ?1",
            params![edge.id.as_str()],
        )?;
        for span in &edge.spans {
            conn.execute(
                "INSERT INTO edge_span (edge_id, chunk_id, span_start, span_end, quote)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    edge.id.as_str(),
                    span.chunk_id.as_str(),
                    span.start as i64,
                    span.end as i64,
                    span.quote,
                ],
            )?;
        }
        Ok(())
    }

    // --- Catalog snapshot ---

    /// Load the full entity/edge snapshot for in-memory resolution.
    pub fn load_catalog(&self) -> StorageResult<EntityCatalog> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, kind, name_ar, definition_ar, parent_id, source_anchor FROM entity ORDER BY id",
        )?;
        let entities: Vec<Entity> = stmt
            .query_map([], row_to_entity)?
            .collect::<Result<_, _>>()?;

        let mut stmt =
            conn.prepare("SELECT id, source_id, target_id, relation, status FROM edge ORDER BY id")?;
        let mut edges: Vec<Edge> = stmt.query_map([], row_to_edge)?.collect::<Result<_, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT edge_id, chunk_id, span_start, span_end, quote FROM edge_span ORDER BY rowid",
        )?;
        let spans: Vec<(String, JustificationSpan)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    JustificationSpan {
                        chunk_id: ChunkId::from_string(row.get::<_, String>(1)?),
                        start: row.get::<_, i64>(2)? as usize,
                        end: row.get::<_, i64>(3)? as usize,
                        quote: row.get(4)?,
                    },
                ))
            })?
            .collect::<Result<_, _>>()?;

        for (edge_id, span) in spans {
            if let Some(edge) = edges.iter_mut().find(|e| e.id.as_str() == edge_id) {
                edge.spans.push(span);
            }
        }

        Ok(EntityCatalog::new(entities, edges))
    }

    // --- Read helpers ---

    fn chunk_by_id(&self, conn: &Connection, chunk_id: &str) -> StorageResult<Option<Chunk>> {
        conn.query_row(
            "SELECT id, entity_id, entity_kind, kind, text_ar, source_anchor, refs
             FROM chunk WHERE id = ?1",
            params![chunk_id],
            row_to_chunk,
        )
        .optional()
        .map_err(StorageError::from)
    }

    fn definition_chunk(
        &self,
        conn: &Connection,
        entity_id: &str,
    ) -> StorageResult<Option<Chunk>> {
        conn.query_row(
            "SELECT id, entity_id, entity_kind, kind, text_ar, source_anchor, refs
             FROM chunk WHERE entity_id = ?1 AND kind = 'definition' ORDER BY id LIMIT 1",
            params![entity_id],
            row_to_chunk,
        )
        .optional()
        .map_err(StorageError::from)
    }
}

fn parse_failure(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let kind: String = row.get(1)?;
    let kind: EntityKind = kind
        .parse()
        .map_err(|e: String| parse_failure(e))?;
    Ok(Entity {
        id: EntityId::from_string(row.get::<_, String>(0)?),
        kind,
        name_ar: row.get(2)?,
        definition_ar: row.get(3)?,
        parent: row
            .get::<_, Option<String>>(4)?
            .map(EntityId::from_string),
        source_anchor: row.get(5)?,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<Edge> {
    let relation: String = row.get(3)?;
    let relation: RelationLabel = relation
        .parse()
        .map_err(|e: String| parse_failure(e))?;
    let status: String = row.get(4)?;
    Ok(Edge {
        id: EdgeId::from_string(row.get::<_, String>(0)?),
        source: EntityId::from_string(row.get::<_, String>(1)?),
        target: EntityId::from_string(row.get::<_, String>(2)?),
        relation,
        status: match status.as_str() {
            "approved" => EdgeStatus::Approved,
            "rejected" => EdgeStatus::Rejected,
            _ => EdgeStatus::Candidate,
        },
        spans: Vec::new(),
    })
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let entity_kind: String = row.get(2)?;
    let entity_kind: EntityKind = entity_kind
        .parse()
        .map_err(|e: String| parse_failure(e))?;
    let kind: String = row.get(3)?;
    let kind: ChunkKind = kind
        .parse()
        .map_err(|e: String| parse_failure(e))?;
    let refs: String = row.get(6)?;
    let refs: Vec<ScriptureRef> = serde_json::from_str(&refs).unwrap_or_default();
    Ok(Chunk {
        id: ChunkId::from_string(row.get::<_, String>(0)?),
        entity_id: EntityId::from_string(row.get::<_, String>(1)?),
        entity_kind,
        kind,
        text_ar: row.get(4)?,
        source_anchor: row.get(5)?,
        refs,
    })
}

fn retrieval_err(e: StorageError) -> RetrievalError {
    RetrievalError::QueryFailed(e.to_string())
}

#[async_trait]
impl EvidenceStore for SqliteStore {
    async fn resolve_entities(&self, keywords: &[String]) -> RetrievalResult<Vec<Entity>> {
        let catalog = self.load_catalog().map_err(retrieval_err)?;
        let mut out = Vec::new();
        for entity in catalog.entities() {
            let name_norm = normalize_for_matching(&entity.name_ar);
            if keywords.iter().any(|k| name_norm.contains(k.as_str())) {
                out.push(entity.clone());
            }
        }
        Ok(out)
    }

    async fn lookup_by_entity(
        &self,
        entity_id: &EntityId,
        limit: usize,
    ) -> RetrievalResult<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, entity_id, entity_kind, kind, text_ar, source_anchor, refs
                 FROM chunk WHERE entity_id = ?1
                 ORDER BY CASE kind
                     WHEN 'definition' THEN 0
                     WHEN 'evidence' THEN 1
                     ELSE 2
                 END, id
                 LIMIT ?2",
            )
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?;
        let chunks = stmt
            .query_map(params![entity_id.as_str(), limit as i64], row_to_chunk)
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RetrievalError::CorruptRecord(e.to_string()))?;
        Ok(chunks)
    }

    async fn vector_search(
        &self,
        text: &str,
        limit: usize,
    ) -> RetrievalResult<Vec<(Chunk, f32)>> {
        let query = self
            .embedder
            .embed(text)
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT chunk_id, vector FROM embedding ORDER BY chunk_id")
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?;
        let vectors: Vec<(String, Vec<f32>)> = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let raw: String = row.get(1)?;
                Ok((id, raw))
            })
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?
            .into_iter()
            .filter_map(|(id, raw)| {
                serde_json::from_str::<Vec<f32>>(&raw).ok().map(|v| (id, v))
            })
            .collect();

        let mut scored: Vec<(String, f32)> = vectors
            .into_iter()
            .map(|(id, v)| {
                let sim = cosine_similarity(&query, &v);
                (id, sim)
            })
            .filter(|(_, sim)| *sim > 0.0)
            .collect();
        // Best first; ties by chunk id for reproducibility.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        let mut out = Vec::with_capacity(scored.len());
        for (id, sim) in scored {
            if let Some(chunk) = self.chunk_by_id(&conn, &id).map_err(retrieval_err)? {
                out.push((chunk, sim));
            }
        }
        Ok(out)
    }

    async fn expand_graph(
        &self,
        entity_ids: &[EntityId],
        depth: usize,
    ) -> RetrievalResult<Vec<GraphHit>> {
        let conn = self.conn.lock().unwrap();
        let mut hits = Vec::new();
        let mut visited: HashSet<String> = entity_ids
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        let mut frontier: Vec<String> = visited.iter().cloned().collect();
        frontier.sort();

        for _hop in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let mut next_frontier = Vec::new();

            for source in &frontier {
                let mut stmt = conn
                    .prepare(
                        "SELECT e.id, e.source_id, e.target_id, e.relation, e.status
                         FROM edge e
                         WHERE e.source_id = ?1 AND e.status = 'approved'
                           AND EXISTS (SELECT 1 FROM edge_span s WHERE s.edge_id = e.id)
                         ORDER BY e.id",
                    )
                    .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?;
                let edges: Vec<Edge> = stmt
                    .query_map(params![source], row_to_edge)
                    .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| RetrievalError::CorruptRecord(e.to_string()))?;

                for edge in edges {
                    let mut stmt = conn
                        .prepare(
                            "SELECT edge_id, chunk_id, span_start, span_end, quote
                             FROM edge_span WHERE edge_id = ?1 ORDER BY rowid",
                        )
                        .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?;
                    let spans: Vec<JustificationSpan> = stmt
                        .query_map(params![edge.id.as_str()], |row| {
                            Ok(JustificationSpan {
                                chunk_id: ChunkId::from_string(row.get::<_, String>(1)?),
                                start: row.get::<_, i64>(2)? as usize,
                                end: row.get::<_, i64>(3)? as usize,
                                quote: row.get(4)?,
                            })
                        })
                        .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| RetrievalError::CorruptRecord(e.to_string()))?;

                    // Enforced by the SQL filter, restated as the data
                    // invariant: no edge without a justification span.
                    let Some(first_span) = spans.first() else {
                        continue;
                    };

                    let provenance = EdgeProvenance {
                        edge_id: edge.id.clone(),
                        relation: edge.relation,
                        source: edge.source.clone(),
                        target: edge.target.clone(),
                        quote: first_span.quote.clone(),
                    };

                    // Target entity's definition chunk.
                    if let Some(chunk) = self
                        .definition_chunk(&conn, edge.target.as_str())
                        .map_err(retrieval_err)?
                    {
                        hits.push(GraphHit {
                            chunk,
                            edge: provenance.clone(),
                        });
                    }

                    // Justification-span chunks.
                    for span in &spans {
                        if let Some(chunk) = self
                            .chunk_by_id(&conn, span.chunk_id.as_str())
                            .map_err(retrieval_err)?
                        {
                            hits.push(GraphHit {
                                chunk,
                                edge: provenance.clone(),
                            });
                        }
                    }

                    if visited.insert(edge.target.as_str().to_string()) {
                        next_frontier.push(edge.target.as_str().to_string());
                    }
                }
            }

            next_frontier.sort();
            frontier = next_frontier;
        }

        Ok(hits)
    }

    async fn get_chunk(&self, chunk_id: &ChunkId) -> RetrievalResult<Option<Chunk>> {
        let conn = self.conn.lock().unwrap();
        self.chunk_by_id(&conn, chunk_id.as_str())
            .map_err(retrieval_err)
    }

    async fn get_edge_evidence(
        &self,
        edge_id: &EdgeId,
    ) -> RetrievalResult<Vec<JustificationSpan>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT edge_id, chunk_id, span_start, span_end, quote
                 FROM edge_span WHERE edge_id = ?1 ORDER BY rowid",
            )
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?;
        let spans = stmt
            .query_map(params![edge_id.as_str()], |row| {
                Ok(JustificationSpan {
                    chunk_id: ChunkId::from_string(row.get::<_, String>(1)?),
                    start: row.get::<_, i64>(2)? as usize,
                    end: row.get::<_, i64>(3)? as usize,
                    quote: row.get(4)?,
                })
            })
            .map_err(|e| RetrievalError::QueryFailed(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RetrievalError::CorruptRecord(e.to_string()))?;
        Ok(spans)
    }
}

#[async_trait]
impl RunStore for SqliteStore {
    async fn append_run(&self, record: RunRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO run
             (request_id, created_at, inputs, response, retrieval_trace, state_trace, timings)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.request_id.to_string(),
                record.created_at.to_rfc3339(),
                serde_json::to_string(&record.inputs)?,
                serde_json::to_string(&record.response)?,
                serde_json::to_string(&record.retrieval_trace)?,
                serde_json::to_string(&record.state_trace)?,
                serde_json::to_string(&record.timings)?,
            ],
        )?;
        Ok(())
    }

    async fn append_feedback(&self, feedback: Feedback) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO feedback (request_id, created_at, rating, tags, comment)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.request_id.to_string(),
                feedback.created_at.to_rfc3339(),
                feedback.rating as i64,
                serde_json::to_string(&feedback.tags)?,
                feedback.comment,
            ],
        )?;
        Ok(())
    }
}
