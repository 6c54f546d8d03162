//! Deterministic structural answers for list intents.
//!
//! Always correct by projection from the catalog, always citing heading
//! chunks, and independent of model availability. Returns `None` when the
//! retrieved packets lack the heading chunks to cite; the caller then
//! falls through to the model path.

use crate::catalog::EntityCatalog;
use crate::pipeline::context::ListenOutput;
use crate::schema::{
    Citation, Entity, EntityRef, EvidencePacket, IntentKind,
};

/// A structurally composed answer before post-generation checks.
#[derive(Debug, Clone)]
pub struct StructuralAnswer {
    pub answer_ar: String,
    pub citations: Vec<Citation>,
    pub entities: Vec<EntityRef>,
}

pub fn build_structural_answer(
    catalog: &EntityCatalog,
    listen: &ListenOutput,
    packets: &[EvidencePacket],
) -> Option<StructuralAnswer> {
    match listen.intent.kind {
        IntentKind::ListPillars => {
            let pillars = catalog.pillars();
            if pillars.is_empty() {
                return None;
            }
            compose(
                "ركائز الحياة الطيبة الخمس هي:",
                &pillars,
                packets,
            )
        }
        IntentKind::ListCoreValues => {
            let target = listen.intent.target_entity.as_ref()?;
            let parent = catalog.get(target)?;
            let children = catalog.children_of(target);
            if children.is_empty() {
                return None;
            }
            compose(
                &format!("القيم الكلية في ركيزة {} هي:", parent.name_ar),
                &children,
                packets,
            )
        }
        IntentKind::ListSubValues => {
            let target = listen.intent.target_entity.as_ref()?;
            let parent = catalog.get(target)?;
            let children = catalog.children_of(target);
            if children.is_empty() {
                return None;
            }
            compose(
                &format!("القيم الجزئية تحت قيمة {} هي:", parent.name_ar),
                &children,
                packets,
            )
        }
        _ => None,
    }
}

/// One bullet per entity; each bullet cites the entity's heading chunk
/// from the retrieved packets.
fn compose(
    heading: &str,
    entities: &[&Entity],
    packets: &[EvidencePacket],
) -> Option<StructuralAnswer> {
    let mut lines = vec![heading.to_string()];
    let mut citations = Vec::new();
    let mut refs = Vec::new();

    for entity in entities {
        lines.push(format!("- {}", entity.name_ar));
        refs.push(EntityRef {
            kind: entity.kind,
            id: entity.id.clone(),
            name_ar: entity.name_ar.clone(),
        });

        let heading_packet = packets
            .iter()
            .filter(|p| p.chunk.entity_id == entity.id && p.is_definition())
            .min_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
        if let Some(packet) = heading_packet {
            citations.push(Citation::unresolved(
                packet.chunk.id.clone(),
                packet.chunk.source_anchor.clone(),
            ));
        }
    }

    // Without heading chunks there is nothing citable; refuse the
    // structural path rather than emit an uncited listing.
    if citations.is_empty() {
        return None;
    }

    Some(StructuralAnswer {
        answer_ar: lines.join("\n"),
        citations,
        entities: refs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{EntityMatch, MatchKind};
    use crate::schema::{Chunk, ChunkKind, EntityKind, HitSource, Intent};

    fn catalog() -> EntityCatalog {
        EntityCatalog::new(
            vec![
                Entity::new("p1", EntityKind::Pillar, "الروحية", "a"),
                Entity::new("p2", EntityKind::Pillar, "العاطفية", "a"),
                Entity::new("cv1", EntityKind::CoreValue, "التزكية", "a").with_parent("p1"),
                Entity::new("cv2", EntityKind::CoreValue, "المراقبة", "a").with_parent("p1"),
            ],
            Vec::new(),
        )
    }

    fn heading_packet(id: &str, entity: &str, text: &str) -> EvidencePacket {
        EvidencePacket {
            chunk: Chunk::new(
                id,
                entity,
                EntityKind::Pillar,
                ChunkKind::Definition,
                text,
                format!("anchor_{id}"),
            ),
            sources: vec![HitSource::EntityExact],
            score: 3.0,
            vector_rank: None,
            edge: None,
        }
    }

    fn listen(kind: IntentKind, target: Option<&str>) -> ListenOutput {
        ListenOutput {
            normalized_question: String::new(),
            listen_summary_ar: String::new(),
            keywords: vec![],
            entities: vec![EntityMatch {
                kind: EntityKind::Pillar,
                id: "p1".into(),
                name_ar: "الروحية".to_string(),
                confidence: 0.8,
                match_kind: MatchKind::Containment,
            }],
            intent: Intent {
                kind,
                in_scope: true,
                confidence: 0.9,
                target_entity: target.map(|t| t.into()),
            },
        }
    }

    #[test]
    fn pillar_listing_cites_heading_chunks() {
        let packets = vec![
            heading_packet("ch_p1", "p1", "الركيزة: الروحية من ركائز الحياة الطيبة"),
            heading_packet("ch_p2", "p2", "الركيزة: العاطفية من ركائز الحياة الطيبة"),
        ];
        let out =
            build_structural_answer(&catalog(), &listen(IntentKind::ListPillars, None), &packets)
                .unwrap();
        assert!(out.answer_ar.starts_with("ركائز الحياة الطيبة الخمس هي:"));
        assert!(out.answer_ar.contains("- الروحية"));
        assert_eq!(out.citations.len(), 2);
        assert_eq!(out.entities.len(), 2);
    }

    #[test]
    fn core_value_listing_scopes_to_target_pillar() {
        let packets = vec![
            heading_packet("ch_cv1", "cv1", "القيمة الكلية: التزكية"),
            heading_packet("ch_cv2", "cv2", "القيمة الكلية: المراقبة"),
        ];
        let out = build_structural_answer(
            &catalog(),
            &listen(IntentKind::ListCoreValues, Some("p1")),
            &packets,
        )
        .unwrap();
        assert!(out.answer_ar.contains("القيم الكلية في ركيزة الروحية"));
        assert!(out.answer_ar.contains("- التزكية"));
        assert!(out.answer_ar.contains("- المراقبة"));
    }

    #[test]
    fn missing_heading_chunks_abort_the_structural_path() {
        let out =
            build_structural_answer(&catalog(), &listen(IntentKind::ListPillars, None), &[]);
        assert!(out.is_none());
    }

    #[test]
    fn non_structural_intent_returns_none() {
        let out =
            build_structural_answer(&catalog(), &listen(IntentKind::Definition, None), &[]);
        assert!(out.is_none());
    }
}
