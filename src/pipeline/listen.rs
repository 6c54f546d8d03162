//! LISTEN: normalize, extract, resolve, classify.
//!
//! Deterministic intent rules run first; the model classifier is only a
//! fallback for questions the rules leave ambiguous. Malformed input never
//! raises: it produces empty keyword and entity lists with the ambiguous
//! intent.

use crate::arabic::{extract_keywords, normalize_for_matching};
use crate::catalog::EntityCatalog;
use crate::config::AccountConfig;
use crate::llm::{IntentRequest, ModelClient};
use crate::pipeline::context::ListenOutput;
use crate::resolver::{EntityMatch, EntityResolver, MatchKind};
use crate::schema::{EntityKind, Intent, IntentKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Run LISTEN. `model` is consulted only when the rules return ambiguous.
pub async fn run_listen(
    resolver: &EntityResolver,
    account: &AccountConfig,
    model: Option<&Arc<dyn ModelClient>>,
    model_deadline: Duration,
    question: &str,
) -> ListenOutput {
    let normalized_question = normalize_for_matching(question);
    let keywords = extract_keywords(question);
    let mut entities = resolver.resolve(question);

    let mut intent = classify_deterministic(&normalized_question, &entities, account);

    // Structure intents project over the catalog: widen the entity list so
    // retrieval fetches every heading chunk the answer will cite.
    expand_structural_entities(resolver.catalog(), &mut entities, &intent);

    if intent.kind == IntentKind::Ambiguous {
        if let Some(model) = model {
            if let Some(model_intent) = classify_with_model(
                resolver.catalog(),
                model,
                model_deadline,
                question,
                &entities,
                &keywords,
            )
            .await
            {
                intent = model_intent;
            }
        }
    }

    let listen_summary_ar = if entities.is_empty() {
        let preview: String = question.chars().take(100).collect();
        format!("سؤال عام: {}", preview.trim())
    } else {
        let names: Vec<&str> = entities.iter().take(3).map(|e| e.name_ar.as_str()).collect();
        format!("السؤال عن: {}", names.join("، "))
    };

    debug!(
        entities = entities.len(),
        keywords = keywords.len(),
        intent = ?intent.kind,
        "listen complete"
    );

    ListenOutput {
        normalized_question,
        listen_summary_ar,
        keywords,
        entities,
        intent,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles
        .iter()
        .any(|n| haystack.contains(&normalize_for_matching(n)))
}

fn contains_any_configured(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .any(|n| haystack.contains(&normalize_for_matching(n)))
}

/// Deterministic intent rules over the normalized question.
fn classify_deterministic(
    q: &str,
    entities: &[EntityMatch],
    account: &AccountConfig,
) -> Intent {
    if q.is_empty() {
        return Intent::ambiguous();
    }

    let has_pillar = entities.iter().any(|e| e.kind == EntityKind::Pillar);
    let has_core = entities.iter().any(|e| e.kind == EntityKind::CoreValue);

    // Fiqh rulings: marker plus worship term, wherever evidence lands.
    if contains_any_configured(q, &account.fiqh_markers)
        && contains_any_configured(q, &account.worship_terms)
    {
        return Intent {
            kind: IntentKind::FiqhRuling,
            in_scope: false,
            confidence: 0.9,
            target_entity: None,
        };
    }

    // Biography and authorship questions.
    if contains_any(q, &["من هو", "من هي", "مؤلف", "من الف", "سيرة", "ترجمة حياة"]) {
        return Intent {
            kind: IntentKind::Biography,
            in_scope: false,
            confidence: 0.8,
            target_entity: None,
        };
    }

    // Structure listings.
    if contains_any(q, &["ركائز", "اركان"]) && contains_any(q, &["الخمس", "خمسة", "5"]) {
        return Intent {
            kind: IntentKind::ListPillars,
            in_scope: true,
            confidence: 0.9,
            target_entity: None,
        };
    }
    if q.contains(&normalize_for_matching("القيم"))
        && contains_any(q, &["الكلية", "الكليه"])
        && has_pillar
    {
        let target = entities
            .iter()
            .find(|e| e.kind == EntityKind::Pillar)
            .map(|e| e.id.clone());
        return Intent {
            kind: IntentKind::ListCoreValues,
            in_scope: true,
            confidence: 0.8,
            target_entity: target,
        };
    }
    if q.contains(&normalize_for_matching("القيم"))
        && contains_any(q, &["الجزئية", "الفرعية"])
        && has_core
    {
        let target = entities
            .iter()
            .find(|e| e.kind == EntityKind::CoreValue)
            .map(|e| e.id.clone());
        return Intent {
            kind: IntentKind::ListSubValues,
            in_scope: true,
            confidence: 0.8,
            target_entity: target,
        };
    }

    // Cross-entity connection before plain comparison: a comparison asked
    // "in terms of effect" or "relation" is a graph question.
    let comparison_marker = contains_any(q, &["قارن", "الفرق", "وازن", "مقارنة"]);
    let connect_marker = contains_any(
        q,
        &["العلاقة بين", "اربط", "الربط بين", "من حيث الاثر", "الاثر على", "اثرها على"],
    );
    if connect_marker && (comparison_marker || entities.len() >= 2) {
        return Intent {
            kind: IntentKind::ConnectAcrossPillars,
            in_scope: true,
            confidence: 0.8,
            target_entity: None,
        };
    }
    if comparison_marker {
        return Intent {
            kind: IntentKind::Comparison,
            in_scope: true,
            confidence: 0.8,
            target_entity: None,
        };
    }

    // Definitions.
    if contains_any(q, &["عرف", "ما معنى", "تعريف", "ما المقصود"])
        || (contains_any(q, &["ما هي", "ما هو"]) && !entities.is_empty())
    {
        return Intent {
            kind: IntentKind::Definition,
            in_scope: true,
            confidence: 0.8,
            target_entity: entities.first().map(|e| e.id.clone()),
        };
    }

    // Practical guidance.
    if contains_any(q, &["كيف", "ما السبيل", "خطوات", "وسائل"]) && !entities.is_empty() {
        return Intent {
            kind: IntentKind::PracticalGuidance,
            in_scope: true,
            confidence: 0.7,
            target_entity: entities.first().map(|e| e.id.clone()),
        };
    }

    // A question with no framework entities and no markers is either
    // general knowledge (clearly off-corpus phrasing) or ambiguous.
    if entities.is_empty() {
        return Intent::ambiguous();
    }

    Intent {
        kind: IntentKind::PracticalGuidance,
        in_scope: true,
        confidence: 0.5,
        target_entity: entities.first().map(|e| e.id.clone()),
    }
}

/// For structure intents, extend the entity list to everything the
/// structural answer will enumerate.
fn expand_structural_entities(
    catalog: &Arc<EntityCatalog>,
    entities: &mut Vec<EntityMatch>,
    intent: &Intent,
) {
    match intent.kind {
        IntentKind::ListPillars => {
            entities.clear();
            for pillar in catalog.pillars() {
                entities.push(EntityMatch {
                    kind: pillar.kind,
                    id: pillar.id.clone(),
                    name_ar: pillar.name_ar.clone(),
                    confidence: 0.8,
                    match_kind: MatchKind::Containment,
                });
            }
        }
        IntentKind::ListCoreValues | IntentKind::ListSubValues => {
            if let Some(target) = &intent.target_entity {
                for child in catalog.children_of(target) {
                    if entities.iter().all(|e| e.id != child.id) {
                        entities.push(EntityMatch {
                            kind: child.kind,
                            id: child.id.clone(),
                            name_ar: child.name_ar.clone(),
                            confidence: 0.8,
                            match_kind: MatchKind::Containment,
                        });
                    }
                }
            }
        }
        _ => {}
    }
}

/// Model fallback for ambiguous questions. Failures keep the ambiguous
/// intent.
async fn classify_with_model(
    catalog: &Arc<EntityCatalog>,
    model: &Arc<dyn ModelClient>,
    deadline: Duration,
    question: &str,
    entities: &[EntityMatch],
    keywords: &[String],
) -> Option<Intent> {
    let request = IntentRequest {
        question: question.to_string(),
        entities: entities.iter().map(|e| e.name_ar.clone()).collect(),
        keywords: keywords.to_vec(),
    };
    let output = tokio::time::timeout(deadline, model.classify_intent(request))
        .await
        .ok()?
        .ok()?;

    let target_entity = output.target_entity.as_deref().and_then(|name| {
        let normalized = normalize_for_matching(name);
        catalog
            .name_index()
            .find(|(n, _)| *n == normalized)
            .map(|(_, e)| e.id.clone())
    });

    Some(Intent {
        kind: output.intent_type,
        in_scope: output.in_scope,
        confidence: output.confidence.clamp(0.0, 1.0),
        target_entity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Entity;

    fn fixture() -> (EntityResolver, AccountConfig) {
        let entities = vec![
            Entity::new("p1", EntityKind::Pillar, "الروحية", "a"),
            Entity::new("p2", EntityKind::Pillar, "العاطفية", "a"),
            Entity::new("p3", EntityKind::Pillar, "الفكرية", "a"),
            Entity::new("p4", EntityKind::Pillar, "الجسدية", "a"),
            Entity::new("p5", EntityKind::Pillar, "الاجتماعية", "a"),
            Entity::new("cv1", EntityKind::CoreValue, "التزكية", "a").with_parent("p1"),
            Entity::new("cv2", EntityKind::CoreValue, "المراقبة", "a").with_parent("p1"),
        ];
        let resolver = EntityResolver::new(Arc::new(EntityCatalog::new(entities, Vec::new())));
        (resolver, AccountConfig::default())
    }

    #[tokio::test]
    async fn pillar_list_question_detected_and_expanded() {
        let (resolver, account) = fixture();
        let out = run_listen(
            &resolver,
            &account,
            None,
            Duration::from_secs(1),
            "ما هي ركائز الحياة الطيبة الخمس؟",
        )
        .await;
        assert_eq!(out.intent.kind, IntentKind::ListPillars);
        assert_eq!(out.entities.len(), 5);
        assert!(out.entities.iter().all(|e| e.kind == EntityKind::Pillar));
    }

    #[tokio::test]
    async fn definition_question_detected() {
        let (resolver, account) = fixture();
        let out = run_listen(
            &resolver,
            &account,
            None,
            Duration::from_secs(1),
            "عرّف التزكية كما ورد في الإطار، واذكر نصًا مُستشهدًا من المصدر.",
        )
        .await;
        assert_eq!(out.intent.kind, IntentKind::Definition);
        assert_eq!(out.entities[0].id.as_str(), "cv1");
    }

    #[tokio::test]
    async fn fiqh_question_flagged_out_of_scope() {
        let (resolver, account) = fixture();
        let out = run_listen(
            &resolver,
            &account,
            None,
            Duration::from_secs(1),
            "ما حكم صيام يوم الجمعة؟",
        )
        .await;
        assert_eq!(out.intent.kind, IntentKind::FiqhRuling);
        assert!(!out.intent.in_scope);
    }

    #[tokio::test]
    async fn biography_question_flagged_out_of_scope() {
        let (resolver, account) = fixture();
        let out = run_listen(
            &resolver,
            &account,
            None,
            Duration::from_secs(1),
            "من هو مؤلف الإطار؟",
        )
        .await;
        assert_eq!(out.intent.kind, IntentKind::Biography);
        assert!(!out.intent.in_scope);
    }

    #[tokio::test]
    async fn comparison_by_effect_is_cross_pillar_connection() {
        let (resolver, account) = fixture();
        let out = run_listen(
            &resolver,
            &account,
            None,
            Duration::from_secs(1),
            "قارن بين التزكية والمراقبة من حيث الأثر على الحياة الروحية.",
        )
        .await;
        assert_eq!(out.intent.kind, IntentKind::ConnectAcrossPillars);
        assert!(out.entities.len() >= 2);
    }

    #[tokio::test]
    async fn poetry_request_is_ambiguous_with_no_entities() {
        let (resolver, account) = fixture();
        let out = run_listen(
            &resolver,
            &account,
            None,
            Duration::from_secs(1),
            "اكتب قصيدة عن الصبر.",
        )
        .await;
        assert_eq!(out.intent.kind, IntentKind::Ambiguous);
        assert!(out.entities.is_empty());
    }

    #[tokio::test]
    async fn malformed_input_never_raises() {
        let (resolver, account) = fixture();
        let out = run_listen(&resolver, &account, None, Duration::from_secs(1), "").await;
        assert_eq!(out.intent.kind, IntentKind::Ambiguous);
        assert!(out.keywords.is_empty());
        assert!(out.entities.is_empty());
    }
}
