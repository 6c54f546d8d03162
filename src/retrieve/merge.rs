//! Deterministic merge and rank of retrieval legs.
//!
//! Packets are deduplicated by chunk id with provenance union. The rank
//! score is `w_entity * entity_hit + w_vector * (1 / vector_rank) +
//! w_graph * graph_hit`, but entity-exact hits sort strictly ahead of
//! everything else regardless of the weights. Ties order by ascending
//! chunk id so two runs of the same request produce identical packet
//! order.

use crate::config::MergeWeights;
use crate::schema::{Chunk, ChunkId, EvidencePacket, HitSource};
use crate::retrieve::traits::GraphHit;
use std::collections::BTreeMap;

/// Merges entity, vector and graph results into ranked evidence packets.
#[derive(Debug, Clone)]
pub struct MergeRanker {
    weights: MergeWeights,
    max_packets: usize,
}

impl MergeRanker {
    pub fn new(weights: MergeWeights, max_packets: usize) -> Self {
        Self {
            weights,
            max_packets,
        }
    }

    /// Merge the three legs. `vector_hits` must be in similarity order
    /// (best first); ranks are derived from that order.
    pub fn merge(
        &self,
        entity_hits: Vec<Chunk>,
        vector_hits: Vec<(Chunk, f32)>,
        graph_hits: Vec<GraphHit>,
    ) -> Vec<EvidencePacket> {
        // BTreeMap keys give the deterministic id-order base.
        let mut packets: BTreeMap<ChunkId, EvidencePacket> = BTreeMap::new();

        for chunk in entity_hits {
            let entry = packets
                .entry(chunk.id.clone())
                .or_insert_with(|| empty_packet(chunk));
            mark_source(entry, HitSource::EntityExact);
        }

        for (rank, (chunk, _score)) in vector_hits.into_iter().enumerate() {
            let entry = packets
                .entry(chunk.id.clone())
                .or_insert_with(|| empty_packet(chunk));
            mark_source(entry, HitSource::Vector);
            let rank = rank + 1;
            entry.vector_rank = Some(entry.vector_rank.map_or(rank, |r| r.min(rank)));
        }

        for hit in graph_hits {
            let entry = packets
                .entry(hit.chunk.id.clone())
                .or_insert_with(|| empty_packet(hit.chunk));
            mark_source(entry, HitSource::GraphExpand);
            if entry.edge.is_none() {
                entry.edge = Some(hit.edge);
            }
        }

        let mut merged: Vec<EvidencePacket> = packets
            .into_values()
            .map(|mut p| {
                p.score = self.score(&p);
                p
            })
            .collect();

        // Entity-exact strictly dominant, then score, then id (already the
        // stable base order from the BTreeMap, but restated for clarity).
        merged.sort_by(|a, b| {
            let a_entity = a.from_source(HitSource::EntityExact);
            let b_entity = b.from_source(HitSource::EntityExact);
            b_entity
                .cmp(&a_entity)
                .then(
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.chunk.id.cmp(&b.chunk.id))
        });
        merged.truncate(self.max_packets);
        merged
    }

    fn score(&self, packet: &EvidencePacket) -> f64 {
        let mut score = 0.0;
        if packet.from_source(HitSource::EntityExact) {
            score += self.weights.entity;
        }
        if let Some(rank) = packet.vector_rank {
            score += self.weights.vector / rank as f64;
        }
        if packet.from_source(HitSource::GraphExpand) {
            score += self.weights.graph;
        }
        score
    }
}

fn empty_packet(chunk: Chunk) -> EvidencePacket {
    EvidencePacket {
        chunk,
        sources: Vec::new(),
        score: 0.0,
        vector_rank: None,
        edge: None,
    }
}

fn mark_source(packet: &mut EvidencePacket, source: HitSource) {
    if !packet.sources.contains(&source) {
        packet.sources.push(source);
        packet.sources.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ChunkKind, EdgeProvenance, EntityKind, RelationLabel};

    fn chunk(id: &str) -> Chunk {
        Chunk::new(
            id,
            "cv_tazkiya",
            EntityKind::CoreValue,
            ChunkKind::Evidence,
            "نص الدليل",
            "anchor",
        )
    }

    fn graph_hit(id: &str) -> GraphHit {
        GraphHit {
            chunk: chunk(id),
            edge: EdgeProvenance {
                edge_id: "e1".into(),
                relation: RelationLabel::Reinforces,
                source: "cv_tazkiya".into(),
                target: "cv_muraqaba".into(),
                quote: "التزكية تثمر المراقبة".to_string(),
            },
        }
    }

    fn ranker() -> MergeRanker {
        MergeRanker::new(MergeWeights::default(), 10)
    }

    #[test]
    fn entity_hits_dominate_vector_hits() {
        let merged = ranker().merge(
            vec![chunk("zz_entity")],
            vec![(chunk("aa_vector"), 0.99)],
            vec![],
        );
        assert_eq!(merged[0].chunk.id.as_str(), "zz_entity");
        assert_eq!(merged[1].chunk.id.as_str(), "aa_vector");
    }

    #[test]
    fn vector_duplicates_of_entity_hits_are_deduplicated() {
        let merged = ranker().merge(
            vec![chunk("c1"), chunk("c2")],
            vec![(chunk("c1"), 0.9), (chunk("c3"), 0.5)],
            vec![],
        );
        assert_eq!(merged.len(), 3);
        let first = &merged[0];
        // c1 keeps entity-exact precedence and unions provenance.
        assert_eq!(first.chunk.id.as_str(), "c1");
        assert!(first.from_source(HitSource::EntityExact));
        assert!(first.from_source(HitSource::Vector));
        assert_eq!(first.vector_rank, Some(1));
    }

    #[test]
    fn ties_order_by_chunk_id() {
        let merged = ranker().merge(vec![chunk("b"), chunk("a"), chunk("c")], vec![], vec![]);
        let ids: Vec<&str> = merged.iter().map(|p| p.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn vector_rank_decays_score() {
        let merged = ranker().merge(
            vec![],
            vec![(chunk("v1"), 0.9), (chunk("v2"), 0.8), (chunk("v3"), 0.7)],
            vec![],
        );
        assert!(merged[0].score > merged[1].score);
        assert!(merged[1].score > merged[2].score);
        assert_eq!(merged[0].score, 1.0);
        assert_eq!(merged[1].score, 0.5);
    }

    #[test]
    fn graph_hits_carry_edge_provenance() {
        let merged = ranker().merge(vec![], vec![], vec![graph_hit("g1")]);
        assert_eq!(merged.len(), 1);
        let edge = merged[0].edge.as_ref().unwrap();
        assert_eq!(edge.relation, RelationLabel::Reinforces);
    }

    #[test]
    fn cap_applies_after_ranking() {
        let ranker = MergeRanker::new(MergeWeights::default(), 2);
        let merged = ranker.merge(
            vec![chunk("e1")],
            vec![(chunk("v1"), 0.9), (chunk("v2"), 0.8)],
            vec![],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].chunk.id.as_str(), "e1");
        assert_eq!(merged[1].chunk.id.as_str(), "v1");
    }

    #[test]
    fn merge_is_reproducible() {
        let run = || {
            ranker().merge(
                vec![chunk("c2"), chunk("c1")],
                vec![(chunk("c3"), 0.9), (chunk("c1"), 0.8)],
                vec![graph_hit("c4")],
            )
        };
        let ids = |packets: &[EvidencePacket]| {
            packets
                .iter()
                .map(|p| p.chunk.id.as_str().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&run()), ids(&run()));
    }
}
