//! PURPOSE: goal plus mandatory constraint set.
//!
//! The model proposes a goal, extra constraints and optionally a plan; the
//! three mandatory constraints are always present in the output whatever
//! the model says. Without a model the goal is synthesized from the
//! detected entities.

use crate::llm::{ModelClient, PurposePathRequest};
use crate::pipeline::context::{ListenOutput, PurposeOutput};
use crate::schema::{IntentKind, Purpose, MANDATORY_CONSTRAINTS};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub async fn run_purpose(
    model: Option<&Arc<dyn ModelClient>>,
    model_deadline: Duration,
    question: &str,
    listen: &ListenOutput,
) -> PurposeOutput {
    if let Some(model) = model {
        let request = PurposePathRequest {
            question: question.to_string(),
            entities: listen.entities.iter().map(|e| e.name_ar.clone()).collect(),
            keywords: listen.keywords.clone(),
        };
        match tokio::time::timeout(model_deadline, model.purpose_path(request)).await {
            Ok(Ok(output)) => {
                let purpose = Purpose {
                    goal_ar: output.goal_ar,
                    constraints: output.constraints,
                }
                .ensure_mandatory();
                let model_plan = if output.path_plan_ar.is_empty() {
                    None
                } else {
                    Some(output.path_plan_ar)
                };
                return PurposeOutput {
                    purpose,
                    model_plan,
                    fallback: false,
                };
            }
            Ok(Err(e)) => debug!(error = %e, "purpose call failed; synthesizing goal"),
            Err(_) => debug!("purpose call timed out; synthesizing goal"),
        }
    }

    PurposeOutput {
        purpose: synthesized_purpose(listen),
        model_plan: None,
        fallback: true,
    }
}

/// Deterministic goal from the detected entities: بيان for definitions,
/// مقارنة for comparisons, توضيح otherwise.
fn synthesized_purpose(listen: &ListenOutput) -> Purpose {
    let goal_ar = if listen.entities.is_empty() {
        "الإجابة عن السؤال من الأدلة المعتمدة فقط".to_string()
    } else {
        let verb = match listen.intent.kind {
            IntentKind::Definition => "بيان",
            IntentKind::Comparison | IntentKind::ConnectAcrossPillars => "مقارنة",
            _ => "توضيح",
        };
        let names: Vec<&str> = listen
            .entities
            .iter()
            .take(3)
            .map(|e| e.name_ar.as_str())
            .collect();
        format!("{} {}", verb, names.join("، "))
    };

    Purpose {
        goal_ar,
        constraints: MANDATORY_CONSTRAINTS.iter().map(|c| c.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelClient, PurposePathOutput};
    use crate::schema::{Difficulty, Intent, IntentKind};

    fn listen_with_entity() -> ListenOutput {
        ListenOutput {
            normalized_question: "عرف التزكيه".to_string(),
            listen_summary_ar: "السؤال عن: التزكية".to_string(),
            keywords: vec!["التزكيه".to_string()],
            entities: vec![crate::resolver::EntityMatch {
                kind: crate::schema::EntityKind::CoreValue,
                id: "cv1".into(),
                name_ar: "التزكية".to_string(),
                confidence: 1.0,
                match_kind: crate::resolver::MatchKind::Exact,
            }],
            intent: Intent {
                kind: IntentKind::Definition,
                in_scope: true,
                confidence: 0.8,
                target_entity: Some("cv1".into()),
            },
        }
    }

    #[tokio::test]
    async fn model_constraints_are_augmented_with_mandatory_set() {
        let model: Arc<dyn ModelClient> = Arc::new(MockModelClient::new().with_purpose(
            PurposePathOutput {
                goal_ar: "بيان معنى التزكية".to_string(),
                constraints: vec!["arabic_only".to_string()],
                path_plan_ar: vec!["خطوة".to_string()],
                difficulty: Difficulty::Medium,
            },
        ));
        let out = run_purpose(
            Some(&model),
            Duration::from_secs(1),
            "عرّف التزكية",
            &listen_with_entity(),
        )
        .await;

        for required in MANDATORY_CONSTRAINTS {
            assert!(out.purpose.constraints.iter().any(|c| c == required));
        }
        assert!(out.purpose.constraints.iter().any(|c| c == "arabic_only"));
        assert!(!out.fallback);
        assert_eq!(out.model_plan.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_model_synthesizes_goal_with_mandatory_constraints_only() {
        let out = run_purpose(
            None,
            Duration::from_secs(1),
            "عرّف التزكية",
            &listen_with_entity(),
        )
        .await;
        assert!(out.fallback);
        assert!(out.purpose.goal_ar.contains("بيان"));
        assert!(out.purpose.goal_ar.contains("التزكية"));
        assert_eq!(out.purpose.constraints.len(), MANDATORY_CONSTRAINTS.len());
    }
}
