//! A small but complete wellbeing-framework snapshot: five pillars, two
//! core values with definitions and scriptural evidence, one sub-value,
//! and justified graph edges. Seeded into an in-memory SQLite store.

use async_trait::async_trait;
use muhasibi::retrieve::{EvidenceStore, GraphHit, RetrievalError, RetrievalResult};
use muhasibi::schema::{
    Chunk, ChunkId, ChunkKind, Edge, EdgeId, EdgeStatus, Entity, EntityId, EntityKind,
    JustificationSpan, RelationLabel, ScriptureKind,
};
use muhasibi::storage::SqliteStore;
use muhasibi::{Engine, EngineConfig, EntityCatalog, ModelClient};
use std::sync::Arc;

pub const TAZKIYA_DEF: &str = "التزكية هي تطهير النفس من أدرانها وتنميتها بالطاعات.";
pub const TAZKIYA_EV: &str = "قال تعالى: قد أفلح من زكاها.";
pub const MURAQABA_DEF: &str =
    "المراقبة هي دوام علم العبد باطلاع الله عليه، وثمرتها مشروطة بصدق التوجه.";
pub const MURAQABA_EV: &str = "قال تعالى: وكان الله على كل شيء رقيبا.";

pub fn pillars() -> Vec<(&'static str, &'static str)> {
    vec![
        ("p_ruhiya", "الروحية"),
        ("p_atifiya", "العاطفية"),
        ("p_fikriya", "الفكرية"),
        ("p_jasadiya", "الجسدية"),
        ("p_ijtimaiya", "الاجتماعية"),
    ]
}

/// Seed the full fixture snapshot into an in-memory store.
pub fn seeded_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().expect("in-memory store");

    for (id, name) in pillars() {
        store
            .insert_entity(&Entity::new(id, EntityKind::Pillar, name, format!("anchor_{id}")))
            .expect("insert pillar");
        store
            .insert_chunk(&Chunk::new(
                format!("{id}_def"),
                id,
                EntityKind::Pillar,
                ChunkKind::Definition,
                format!("الركيزة: {name} وهي ركيزة من ركائز الحياة الطيبة الخمس المعتمدة في الإطار."),
                format!("anchor_{id}_def"),
            ))
            .expect("insert pillar heading");
    }

    store
        .insert_entity(
            &Entity::new("cv_tazkiya", EntityKind::CoreValue, "التزكية", "anchor_taz")
                .with_parent("p_ruhiya")
                .with_definition(TAZKIYA_DEF),
        )
        .expect("insert core value");
    store
        .insert_entity(
            &Entity::new("cv_muraqaba", EntityKind::CoreValue, "المراقبة", "anchor_mur")
                .with_parent("p_ruhiya")
                .with_definition(MURAQABA_DEF),
        )
        .expect("insert core value");
    store
        .insert_entity(
            &Entity::new("sv_muhasaba", EntityKind::SubValue, "محاسبة النفس", "anchor_muh")
                .with_parent("cv_tazkiya"),
        )
        .expect("insert sub value");

    store
        .insert_chunk(&Chunk::new(
            "taz_def",
            "cv_tazkiya",
            EntityKind::CoreValue,
            ChunkKind::Definition,
            TAZKIYA_DEF,
            "anchor_taz_def",
        ))
        .expect("insert chunk");
    store
        .insert_chunk(
            &Chunk::new(
                "taz_ev",
                "cv_tazkiya",
                EntityKind::CoreValue,
                ChunkKind::Evidence,
                TAZKIYA_EV,
                "anchor_taz_ev",
            )
            .with_ref(ScriptureKind::Quran, "الشمس:9"),
        )
        .expect("insert chunk");
    store
        .insert_chunk(&Chunk::new(
            "taz_com",
            "cv_tazkiya",
            EntityKind::CoreValue,
            ChunkKind::Commentary,
            "التزكية جهاد مستمر لا ينقطع ما دام العبد حيا.",
            "anchor_taz_com",
        ))
        .expect("insert chunk");
    store
        .insert_chunk(&Chunk::new(
            "mur_def",
            "cv_muraqaba",
            EntityKind::CoreValue,
            ChunkKind::Definition,
            MURAQABA_DEF,
            "anchor_mur_def",
        ))
        .expect("insert chunk");
    store
        .insert_chunk(
            &Chunk::new(
                "mur_ev",
                "cv_muraqaba",
                EntityKind::CoreValue,
                ChunkKind::Evidence,
                MURAQABA_EV,
                "anchor_mur_ev",
            )
            .with_ref(ScriptureKind::Quran, "الأحزاب:52"),
        )
        .expect("insert chunk");
    store
        .insert_chunk(&Chunk::new(
            "muh_def",
            "sv_muhasaba",
            EntityKind::SubValue,
            ChunkKind::Definition,
            "محاسبة النفس هي مطالبة النفس بما قدمت وتأملها فيما فعلت.",
            "anchor_muh_def",
        ))
        .expect("insert chunk");

    // Tazkiya strengthens muraqaba, justified from both definitions; the
    // second span carries a boundary clause.
    store
        .insert_edge(
            &Edge::new("e_taz_mur", "cv_tazkiya", "cv_muraqaba", RelationLabel::Reinforces)
                .approved()
                .with_span("taz_def", 0, 28, "التزكية هي تطهير النفس من أدرانها")
                .with_span("mur_def", 34, 62, "وثمرتها مشروطة بصدق التوجه"),
        )
        .expect("insert edge");
    store
        .insert_edge(
            &Edge::new("e_ruh_taz", "p_ruhiya", "cv_tazkiya", RelationLabel::Contains)
                .approved()
                .with_span("p_ruhiya_def", 0, 16, "الركيزة: الروحية"),
        )
        .expect("insert edge");
    // A candidate edge with spans and an approved edge without spans:
    // neither may surface in retrieval.
    store
        .insert_edge(
            &Edge::new("e_candidate", "cv_muraqaba", "sv_muhasaba", RelationLabel::Enables)
                .with_span("mur_def", 0, 8, "المراقبة"),
        )
        .expect("insert edge");
    store
        .insert_edge(
            &Edge {
                id: "e_spanless".into(),
                source: "cv_muraqaba".into(),
                target: "cv_tazkiya".into(),
                relation: RelationLabel::Complements,
                status: EdgeStatus::Approved,
                spans: Vec::new(),
            },
        )
        .expect("insert edge");

    Arc::new(store)
}

/// Engine over the seeded fixture, optionally with a scripted model.
pub fn engine_with(model: Option<Arc<dyn ModelClient>>) -> Engine {
    let store = seeded_store();
    let catalog = Arc::new(store.load_catalog().expect("catalog"));
    Engine::new(catalog, store.clone(), model, EngineConfig::default()).with_run_store(store)
}

pub fn fixture_catalog() -> Arc<EntityCatalog> {
    let store = seeded_store();
    Arc::new(store.load_catalog().expect("catalog"))
}

/// A store whose every call fails, for retrieval-unavailable paths.
pub struct FailingStore;

#[async_trait]
impl EvidenceStore for FailingStore {
    async fn resolve_entities(&self, _keywords: &[String]) -> RetrievalResult<Vec<Entity>> {
        Err(RetrievalError::Unavailable("store down".to_string()))
    }

    async fn lookup_by_entity(
        &self,
        _entity_id: &EntityId,
        _limit: usize,
    ) -> RetrievalResult<Vec<Chunk>> {
        Err(RetrievalError::Unavailable("store down".to_string()))
    }

    async fn vector_search(
        &self,
        _text: &str,
        _limit: usize,
    ) -> RetrievalResult<Vec<(Chunk, f32)>> {
        Err(RetrievalError::Unavailable("store down".to_string()))
    }

    async fn expand_graph(
        &self,
        _entity_ids: &[EntityId],
        _depth: usize,
    ) -> RetrievalResult<Vec<GraphHit>> {
        Err(RetrievalError::Unavailable("store down".to_string()))
    }

    async fn get_chunk(&self, _chunk_id: &ChunkId) -> RetrievalResult<Option<Chunk>> {
        Err(RetrievalError::Unavailable("store down".to_string()))
    }

    async fn get_edge_evidence(
        &self,
        _edge_id: &EdgeId,
    ) -> RetrievalResult<Vec<JustificationSpan>> {
        Err(RetrievalError::Unavailable("store down".to_string()))
    }
}
