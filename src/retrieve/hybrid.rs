//! Hybrid retriever.
//!
//! Fixed procedure: entity-exact lookup, vector-nearest search and graph
//! expansion run concurrently under the retrieval deadline, then merge.
//! When the vector leg comes back sparse, a single strict query-rewrite
//! round re-runs the legs with each rewrite and merges once more. A failed
//! or timed-out leg contributes empty results; this stage never surfaces
//! retrieval errors.

use crate::config::{RetrievalConfig, Timeouts};
use crate::llm::{ModelClient, ModelError, RewriteRequest};
use crate::resolver::EntityMatch;
use crate::retrieve::merge::MergeRanker;
use crate::retrieve::traits::{EvidenceStore, GraphHit};
use crate::schema::{Chunk, EntityId, EvidencePacket};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of the RETRIEVE stage.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub packets: Vec<EvidencePacket>,
    /// Rewrites applied during the sparse-hit round, if any.
    pub rewrites_used: Vec<String>,
    /// Disambiguation question offered by the rewrite contract.
    pub disambiguation_ar: Option<String>,
}

/// Orchestrates the three retrieval legs and the rewrite round.
pub struct HybridRetriever {
    store: Arc<dyn EvidenceStore>,
    model: Option<Arc<dyn ModelClient>>,
    config: RetrievalConfig,
    timeouts: Timeouts,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        model: Option<Arc<dyn ModelClient>>,
        config: RetrievalConfig,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            model,
            config,
            timeouts,
        }
    }

    /// Retrieve evidence packets for a normalized question.
    pub async fn retrieve(
        &self,
        question: &str,
        entities: &[EntityMatch],
        keywords: &[String],
    ) -> RetrievalOutcome {
        let entity_ids: Vec<EntityId> = entities.iter().map(|m| m.id.clone()).collect();

        let (mut entity_hits, mut vector_hits, mut graph_hits) =
            self.run_legs(question, &entity_ids).await;

        let distinct_vector = vector_hits
            .iter()
            .map(|(c, _)| c.id.as_str())
            .collect::<HashSet<&str>>()
            .len();

        let mut rewrites_used = Vec::new();
        let mut disambiguation_ar = None;

        if distinct_vector < self.config.rewrite_threshold {
            if let Some(rewrite) = self.request_rewrites(question, entities, keywords).await {
                disambiguation_ar = rewrite.disambiguation_ar;
                for query in rewrite.rewrites_ar.into_iter().take(5) {
                    if query.trim().is_empty() {
                        continue;
                    }
                    let (e, v, g) = self.run_legs(&query, &entity_ids).await;
                    entity_hits.extend(e);
                    vector_hits.extend(v);
                    graph_hits.extend(g);
                    rewrites_used.push(query);
                }
            }
        }

        let ranker = MergeRanker::new(self.config.weights, self.config.max_packets);
        let packets = ranker.merge(entity_hits, vector_hits, graph_hits);
        debug!(
            packets = packets.len(),
            rewrites = rewrites_used.len(),
            "retrieval merged"
        );

        RetrievalOutcome {
            packets,
            rewrites_used,
            disambiguation_ar,
        }
    }

    /// Run the three legs concurrently. Each leg has the retrieval
    /// deadline; failures collapse to empty results.
    async fn run_legs(
        &self,
        question: &str,
        entity_ids: &[EntityId],
    ) -> (Vec<Chunk>, Vec<(Chunk, f32)>, Vec<GraphHit>) {
        let deadline = self.timeouts.retrieval;

        let entity_leg = async {
            let mut chunks = Vec::new();
            for id in entity_ids {
                // Definition chunk plus top-K evidence per entity. A
                // failed lookup drops that entity's contribution only;
                // the remaining entities are still fetched.
                let limit = self.config.entity_topk.saturating_add(1);
                match swallow(deadline, self.store.lookup_by_entity(id, limit), "entity").await {
                    Some(batch) => chunks.extend(batch),
                    None => continue,
                }
            }
            chunks
        };

        let vector_leg = async {
            swallow(
                deadline,
                self.store.vector_search(question, self.config.vector_topk),
                "vector",
            )
            .await
            .unwrap_or_default()
        };

        let graph_leg = async {
            if entity_ids.is_empty() {
                return Vec::new();
            }
            swallow(
                deadline,
                self.store.expand_graph(entity_ids, self.config.graph_depth),
                "graph",
            )
            .await
            .unwrap_or_default()
        };

        tokio::join!(entity_leg, vector_leg, graph_leg)
    }

    /// Invoke the strict rewrite contract. The model must not answer; its
    /// output is limited to rewrites plus an optional disambiguation
    /// question.
    async fn request_rewrites(
        &self,
        question: &str,
        entities: &[EntityMatch],
        keywords: &[String],
    ) -> Option<crate::llm::RewriteOutput> {
        let model = self.model.as_ref()?;
        let request = RewriteRequest {
            question: question.to_string(),
            entities: entities.iter().map(|m| m.name_ar.clone()).collect(),
            keywords: keywords.to_vec(),
        };
        match tokio::time::timeout(self.timeouts.model, model.rewrite_query(request)).await {
            Ok(Ok(output)) => Some(output),
            Ok(Err(ModelError::SchemaViolation(msg))) => {
                warn!(%msg, "rewrite output rejected");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "rewrite call failed");
                None
            }
            Err(_) => {
                warn!("rewrite call timed out");
                None
            }
        }
    }
}

/// Await a retrieval call under a deadline, collapsing errors and timeouts
/// to `None`.
async fn swallow<T, F>(deadline: Duration, fut: F, leg: &'static str) -> Option<T>
where
    F: std::future::Future<Output = crate::retrieve::traits::RetrievalResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(leg, error = %e, "retrieval leg failed");
            None
        }
        Err(_) => {
            warn!(leg, "retrieval leg timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{EntityMatch, MatchKind};
    use crate::retrieve::traits::{RetrievalError, RetrievalResult};
    use crate::schema::{Chunk, ChunkId, ChunkKind, EdgeId, Entity, EntityKind, JustificationSpan};
    use async_trait::async_trait;

    /// Store where one entity's shard is down but everything else works.
    struct HalfBrokenStore;

    #[async_trait]
    impl EvidenceStore for HalfBrokenStore {
        async fn resolve_entities(&self, _keywords: &[String]) -> RetrievalResult<Vec<Entity>> {
            Ok(Vec::new())
        }

        async fn lookup_by_entity(
            &self,
            entity_id: &EntityId,
            _limit: usize,
        ) -> RetrievalResult<Vec<Chunk>> {
            if entity_id.as_str() == "cv_broken" {
                return Err(RetrievalError::Unavailable("entity shard down".to_string()));
            }
            Ok(vec![Chunk::new(
                "taz_def",
                "cv_tazkiya",
                EntityKind::CoreValue,
                ChunkKind::Definition,
                "التزكية هي تطهير النفس من أدرانها",
                "anchor_taz_def",
            )])
        }

        async fn vector_search(
            &self,
            _text: &str,
            _limit: usize,
        ) -> RetrievalResult<Vec<(Chunk, f32)>> {
            Ok(Vec::new())
        }

        async fn expand_graph(
            &self,
            _entity_ids: &[EntityId],
            _depth: usize,
        ) -> RetrievalResult<Vec<GraphHit>> {
            Ok(Vec::new())
        }

        async fn get_chunk(&self, _chunk_id: &ChunkId) -> RetrievalResult<Option<Chunk>> {
            Ok(None)
        }

        async fn get_edge_evidence(
            &self,
            _edge_id: &EdgeId,
        ) -> RetrievalResult<Vec<JustificationSpan>> {
            Ok(Vec::new())
        }
    }

    fn entity(id: &str, name_ar: &str) -> EntityMatch {
        EntityMatch {
            kind: EntityKind::CoreValue,
            id: id.into(),
            name_ar: name_ar.to_string(),
            confidence: 1.0,
            match_kind: MatchKind::Exact,
        }
    }

    // === Scenario: one entity's lookup fails, the others still fetch ===
    #[tokio::test]
    async fn failed_entity_lookup_skips_only_that_entity() {
        let retriever = HybridRetriever::new(
            Arc::new(HalfBrokenStore),
            None,
            crate::config::RetrievalConfig::default(),
            crate::config::Timeouts::default(),
        );
        // The broken entity comes first; the healthy one must still be
        // looked up.
        let entities = vec![entity("cv_broken", "المجاهدة"), entity("cv_tazkiya", "التزكية")];

        let outcome = retriever.retrieve("عرف التزكيه", &entities, &[]).await;

        assert_eq!(outcome.packets.len(), 1);
        assert_eq!(outcome.packets[0].chunk.id.as_str(), "taz_def");
        assert!(outcome.rewrites_used.is_empty());
    }
}
