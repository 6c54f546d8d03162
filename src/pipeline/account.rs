//! ACCOUNT: the refusal gate.
//!
//! Enforces, in precedence order: the scope policy (fiqh rulings and
//! biography questions are refused whatever the evidence looks like),
//! evidence existence, and lexical relevance. Scope precedes existence so
//! a fiqh question keeps its out-of-scope refusal and reframing even when
//! retrieval came back empty. Structural list intents bypass the lexical
//! gate: their answers are backed by heading chunks that may share few
//! surface tokens with the question.

use crate::arabic::normalize_for_matching;
use crate::config::AccountConfig;
use crate::pipeline::context::{AccountDecision, AccountOutput, ListenOutput};
use crate::schema::{EvidencePacket, IntentKind};

/// Refusal message for missing evidence.
pub const INSUFFICIENT_MESSAGE_AR: &str =
    "لا يوجد في البيانات الحالية ما يدعم الإجابة على هذا السؤال.";

/// Refusal message for fiqh rulings.
pub const FIQH_MESSAGE_AR: &str =
    "هذا سؤال فقهي حُكمي خارج نطاق هذا النظام، ولا يُجاب عنه من هذا الإطار.";

/// Refusal message for biography and general-knowledge questions.
pub const OUT_OF_SCOPE_MESSAGE_AR: &str = "هذا السؤال خارج نطاق محتوى الإطار المعتمد.";

pub fn run_account(
    config: &AccountConfig,
    listen: &ListenOutput,
    packets: &[EvidencePacket],
) -> AccountOutput {
    let mut issues = Vec::new();
    let q = &listen.normalized_question;

    // Scope: fiqh ruling. Refused with an in-scope reframing, regardless
    // of what retrieval found.
    if listen.intent.kind == IntentKind::FiqhRuling || is_fiqh_question(config, q) {
        issues.push("السؤال فقهي حُكمي خارج نطاق النظام".to_string());
        return AccountOutput {
            decision: AccountDecision::OutOfScopeRefuse {
                suggestion_ar: Some(fiqh_reframing(q)),
            },
            issues,
            reasons: vec!["out_of_scope_fiqh".to_string()],
        };
    }

    // Scope: biography and other classifier-marked out-of-scope intents
    // get a plain refusal, no reframing.
    if matches!(
        listen.intent.kind,
        IntentKind::Biography | IntentKind::GeneralKnowledge
    ) || (!listen.intent.in_scope && listen.intent.kind != IntentKind::Ambiguous)
    {
        issues.push("السؤال خارج نطاق محتوى الإطار".to_string());
        return AccountOutput {
            decision: AccountDecision::OutOfScopeRefuse { suggestion_ar: None },
            issues,
            reasons: vec!["out_of_scope".to_string()],
        };
    }

    // Existence.
    if packets.is_empty() {
        issues.push("لا توجد أدلة متاحة".to_string());
        return AccountOutput {
            decision: AccountDecision::InsufficientRefuse,
            issues,
            reasons: vec!["no_evidence".to_string()],
        };
    }

    // Relevance. Structural list answers are projected from headings and
    // skip the lexical check.
    if !listen.intent.kind.is_structural() {
        let combined = normalize_for_matching(
            &packets
                .iter()
                .map(|p| p.chunk.text_ar.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );

        let matched = listen
            .keywords
            .iter()
            .filter(|k| combined.contains(k.as_str()))
            .count();
        if !listen.keywords.is_empty() && matched < config.min_keyword_match {
            issues.push(
                "السؤال خارج نطاق البيانات المتاحة أو لا توجد صلة كافية بالأدلة".to_string(),
            );
            return AccountOutput {
                decision: AccountDecision::InsufficientRefuse,
                issues,
                reasons: vec!["no_keyword_match".to_string()],
            };
        }

        // Multi-entity coverage: each detected entity must match at least
        // one packet, unless that packet is its definition chunk.
        if listen.entities.len() >= 2 {
            for entity in &listen.entities {
                let covered = packets.iter().any(|p| {
                    if p.chunk.entity_id == entity.id && p.is_definition() {
                        return true;
                    }
                    let name = normalize_for_matching(&entity.name_ar);
                    !name.is_empty()
                        && normalize_for_matching(&p.chunk.text_ar).contains(&name)
                });
                if !covered {
                    issues.push(format!("لا يوجد دليل يغطي: {}", entity.name_ar));
                    return AccountOutput {
                        decision: AccountDecision::InsufficientRefuse,
                        issues,
                        reasons: vec!["entity_not_covered".to_string()],
                    };
                }
            }
        }
    }

    AccountOutput {
        decision: AccountDecision::Sufficient,
        issues,
        reasons: vec![],
    }
}

fn is_fiqh_question(config: &AccountConfig, normalized_question: &str) -> bool {
    let has_marker = config
        .fiqh_markers
        .iter()
        .any(|m| normalized_question.contains(&normalize_for_matching(m)));
    let has_worship = config
        .worship_terms
        .iter()
        .any(|t| normalized_question.contains(&normalize_for_matching(t)));
    has_marker && has_worship
}

/// In-scope reframing for a refused fiqh question, pointing to the
/// framework-level analog.
fn fiqh_reframing(normalized_question: &str) -> String {
    let fasting = ["صيام", "صوم"]
        .iter()
        .any(|t| normalized_question.contains(&normalize_for_matching(t)));
    if fasting {
        "بديل داخل النطاق: ما أثر الصيام كعبادة على تزكية النفس والطاعة كإطار للحياة الطيبة؟"
            .to_string()
    } else {
        "بديل داخل النطاق: كيف يرتبط هذا الموضوع بقيم العبادة والتزكية كإطار للحياة الطيبة؟"
            .to_string()
    }
}
