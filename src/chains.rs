//! Argument-chain construction.
//!
//! For every graph-expand packet that the final answer cites, one chain is
//! emitted: the edge's relation label as the inference type and its
//! justification quote as the claim. Two cited chunks justifying the same
//! edge yield two chains. A boundary clause is attached when any of the
//! edge's spans carries a boundary marker (limits, conditions, warnings).

use crate::arabic::normalize_for_matching;
use crate::catalog::EntityCatalog;
use crate::schema::{ArgumentChain, ChunkId, Citation, EvidencePacket};
use std::collections::HashSet;

/// Markers indicating a span states a limit or condition rather than a
/// supporting claim.
const BOUNDARY_MARKERS: &[&str] = &[
    "ضوابط",
    "حدود",
    "ميزان",
    "انحراف",
    "افراط",
    "تفريط",
    "لا ينبغي",
    "لا يجوز",
    "لا يصح",
    "تحذير",
    "تنبيه",
    "محاذير",
    "مشروط",
    "شرط",
    "متوقف علي",
];

fn is_boundary_text(text_ar: &str) -> bool {
    let normalized = normalize_for_matching(text_ar);
    if normalized.is_empty() {
        return false;
    }
    BOUNDARY_MARKERS
        .iter()
        .any(|m| normalized.contains(&normalize_for_matching(m)))
}

/// Build argument chains from the cited graph-expand packets: one chain
/// per cited packet, in citation order. Duplicate citations of the same
/// chunk collapse to one chain.
pub fn build_argument_chains(
    citations: &[Citation],
    packets: &[EvidencePacket],
    catalog: &EntityCatalog,
) -> Vec<ArgumentChain> {
    let mut seen: HashSet<ChunkId> = HashSet::new();
    let mut chains = Vec::new();

    for citation in citations {
        if !seen.insert(citation.chunk_id.clone()) {
            continue;
        }
        let Some(packet) = packets.iter().find(|p| p.chunk.id == citation.chunk_id) else {
            continue;
        };
        let Some(edge_info) = &packet.edge else {
            continue;
        };

        // Boundary clause: first boundary-marked span on the edge, if the
        // catalog still knows the edge.
        let boundary_ar = catalog.edge(&edge_info.edge_id).and_then(|edge| {
            edge.spans
                .iter()
                .find(|span| is_boundary_text(&span.quote))
                .map(|span| span.quote.clone())
        });

        chains.push(ArgumentChain {
            edge_id: edge_info.edge_id.clone(),
            claim_ar: edge_info.quote.clone(),
            inference: edge_info.relation,
            boundary_ar,
        });
    }

    chains
}
