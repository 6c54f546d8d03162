//! PATH: plan and difficulty.
//!
//! Difficulty derives from the detected entity count; comparison and
//! cross-pillar intents harden it one level. The plan is the model's when
//! PURPOSE got one, the default four steps otherwise.

use crate::pipeline::context::{ListenOutput, PathOutput, PurposeOutput};
use crate::schema::{Difficulty, IntentKind};

/// Default plan steps.
pub fn default_plan() -> Vec<String> {
    vec![
        "استخراج الكيانات المذكورة في السؤال".to_string(),
        "استرجاع التعريفات والأدلة من القاعدة المعتمدة".to_string(),
        "التحقق من تغطية الأدلة للسؤال".to_string(),
        "صياغة الإجابة مع الاستشهادات".to_string(),
    ]
}

pub fn run_path(listen: &ListenOutput, purpose: &PurposeOutput) -> PathOutput {
    let base = match listen.entities.len() {
        0 => Difficulty::Hard,
        1 => Difficulty::Medium,
        _ => Difficulty::Easy,
    };
    let difficulty = match listen.intent.kind {
        IntentKind::Comparison | IntentKind::ConnectAcrossPillars => base.harder(),
        _ => base,
    };

    let plan_ar = purpose
        .model_plan
        .clone()
        .unwrap_or_else(default_plan);

    PathOutput { plan_ar, difficulty }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{EntityMatch, MatchKind};
    use crate::schema::{EntityKind, Intent, Purpose, MANDATORY_CONSTRAINTS};

    fn listen(entity_count: usize, kind: IntentKind) -> ListenOutput {
        let entities = (0..entity_count)
            .map(|i| EntityMatch {
                kind: EntityKind::CoreValue,
                id: format!("cv{i}").into(),
                name_ar: format!("قيمة{i}"),
                confidence: 1.0,
                match_kind: MatchKind::Exact,
            })
            .collect();
        ListenOutput {
            normalized_question: String::new(),
            listen_summary_ar: String::new(),
            keywords: vec![],
            entities,
            intent: Intent {
                kind,
                in_scope: true,
                confidence: 0.8,
                target_entity: None,
            },
        }
    }

    fn purpose(model_plan: Option<Vec<String>>) -> PurposeOutput {
        PurposeOutput {
            purpose: Purpose {
                goal_ar: "هدف".to_string(),
                constraints: MANDATORY_CONSTRAINTS.iter().map(|c| c.to_string()).collect(),
            },
            model_plan,
            fallback: false,
        }
    }

    #[test]
    fn difficulty_follows_entity_count() {
        assert_eq!(
            run_path(&listen(0, IntentKind::Definition), &purpose(None)).difficulty,
            Difficulty::Hard
        );
        assert_eq!(
            run_path(&listen(1, IntentKind::Definition), &purpose(None)).difficulty,
            Difficulty::Medium
        );
        assert_eq!(
            run_path(&listen(3, IntentKind::Definition), &purpose(None)).difficulty,
            Difficulty::Easy
        );
    }

    #[test]
    fn comparison_hardens_one_level() {
        assert_eq!(
            run_path(&listen(2, IntentKind::Comparison), &purpose(None)).difficulty,
            Difficulty::Medium
        );
        assert_eq!(
            run_path(&listen(1, IntentKind::ConnectAcrossPillars), &purpose(None)).difficulty,
            Difficulty::Hard
        );
    }

    #[test]
    fn model_plan_wins_over_default() {
        let steps = vec!["خطوة أولى".to_string()];
        let out = run_path(&listen(1, IntentKind::Definition), &purpose(Some(steps.clone())));
        assert_eq!(out.plan_ar, steps);

        let out = run_path(&listen(1, IntentKind::Definition), &purpose(None));
        assert_eq!(out.plan_ar.len(), 4);
    }
}
