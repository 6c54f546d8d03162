//! INTERPRET: evidence-bound answer construction.
//!
//! Order of preference: deterministic structural answer for list intents,
//! schema-constrained model answer, deterministic two-section fallback.
//! Whatever produced the answer, the same post-generation pass runs:
//! citation hydration, span resolution, guardrails, argument chains.

use crate::arabic::normalize_for_matching;
use crate::catalog::EntityCatalog;
use crate::guardrails::{GuardrailVerdict, Guardrails};
use crate::llm::{InterpretRequest, ModelClient, ModelError};
use crate::pipeline::context::{InterpretedAnswer, ListenOutput, StageResult};
use crate::pipeline::structure::build_structural_answer;
use crate::schema::{
    AbstainReason, ChunkKind, Citation, Confidence, ContractOutcome, EntityRef, EvidencePacket,
    Mode,
};
use crate::spans::SpanResolver;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::account::INSUFFICIENT_MESSAGE_AR;
use super::context::Abstention;

pub struct InterpretDeps<'a> {
    pub catalog: &'a EntityCatalog,
    pub model: Option<&'a Arc<dyn ModelClient>>,
    pub model_deadline: Duration,
    pub guardrails: &'a Guardrails,
    pub resolver: &'a SpanResolver,
}

pub async fn run_interpret(
    deps: InterpretDeps<'_>,
    question: &str,
    mode: Mode,
    listen: &ListenOutput,
    packets: &[EvidencePacket],
) -> StageResult<InterpretedAnswer> {
    // Structural answering first: no model call for list intents.
    if listen.intent.kind.is_structural() {
        if let Some(structural) = build_structural_answer(deps.catalog, listen, packets) {
            let mut answer = InterpretedAnswer {
                answer_ar: structural.answer_ar,
                citations: structural.citations,
                entities: structural.entities,
                not_found: false,
                confidence: Confidence::High,
                argument_chains: Vec::new(),
                outcome_hint: ContractOutcome::PassFull,
                reasons: Vec::new(),
                abstain_reason: None,
            };
            return finish(deps, listen, packets, &mut answer);
        }
        debug!("structural path unavailable; falling through");
    }

    // Model-assisted answering.
    if let Some(model) = deps.model {
        let request = InterpretRequest {
            question: question.to_string(),
            evidence_packets: packets.to_vec(),
            entities: listen.entities.iter().map(|e| e.name_ar.clone()).collect(),
            mode,
        };
        match tokio::time::timeout(deps.model_deadline, model.interpret(request)).await {
            Ok(Ok(output)) => {
                if output.not_found {
                    // The model refused within its contract.
                    return StageResult::Abstain(
                        Abstention::refuse(
                            AbstainReason::InsufficientEvidence,
                            INSUFFICIENT_MESSAGE_AR,
                            "model_refused",
                        ),
                    );
                }
                let mut answer = from_model_output(output, listen, packets);
                return finish(deps, listen, packets, &mut answer);
            }
            Ok(Err(ModelError::SchemaViolation(msg))) => {
                warn!(%msg, "interpret output violated schema; using fallback");
            }
            Ok(Err(e)) => warn!(error = %e, "interpret call failed; using fallback"),
            Err(_) => warn!("interpret call timed out; using fallback"),
        }
    }

    // Deterministic fallback: definition plus evidence, verbatim.
    match deterministic_fallback(listen, packets) {
        Some(mut answer) => finish(deps, listen, packets, &mut answer),
        None => StageResult::Abstain(Abstention::fail(
            AbstainReason::ModelUnavailable,
            INSUFFICIENT_MESSAGE_AR,
            "model_unavailable_no_definition",
        )),
    }
}

/// Map the model's structured output into the pipeline's answer record.
fn from_model_output(
    output: crate::llm::InterpretOutput,
    listen: &ListenOutput,
    packets: &[EvidencePacket],
) -> InterpretedAnswer {
    let citations = output
        .citations
        .into_iter()
        .map(|c| {
            // Hydrate a missing anchor from the matching packet.
            let anchor = if c.source_anchor.is_empty() {
                packets
                    .iter()
                    .find(|p| p.chunk.id.as_str() == c.chunk_id)
                    .map(|p| p.chunk.source_anchor.clone())
                    .unwrap_or_default()
            } else {
                c.source_anchor
            };
            let mut citation = Citation::unresolved(c.chunk_id, anchor);
            citation.reference = c.reference;
            citation
        })
        .collect();

    InterpretedAnswer {
        answer_ar: output.answer_ar,
        citations,
        entities: entity_refs(listen),
        not_found: false,
        confidence: output.confidence,
        argument_chains: Vec::new(),
        outcome_hint: ContractOutcome::PassFull,
        reasons: Vec::new(),
        abstain_reason: None,
    }
}

/// Two-section answer from the top definition and evidence chunks, cited
/// verbatim. Requires at least one definition packet.
fn deterministic_fallback(
    listen: &ListenOutput,
    packets: &[EvidencePacket],
) -> Option<InterpretedAnswer> {
    let definition = packets.iter().find(|p| p.chunk.kind == ChunkKind::Definition)?;
    let evidence = packets.iter().find(|p| p.chunk.kind == ChunkKind::Evidence);

    let mut sections = vec![format!("التعريف:\n{}", definition.chunk.text_ar.trim())];
    let mut citations = vec![citation_for(definition)];

    if let Some(evidence) = evidence {
        sections.push(format!("الدليل/التأصيل:\n{}", evidence.chunk.text_ar.trim()));
        citations.push(citation_for(evidence));
    }

    Some(InterpretedAnswer {
        answer_ar: sections.join("\n\n"),
        citations,
        entities: entity_refs(listen),
        not_found: false,
        confidence: Confidence::Medium,
        argument_chains: Vec::new(),
        outcome_hint: ContractOutcome::PassFull,
        reasons: vec!["deterministic_fallback".to_string()],
        abstain_reason: None,
    })
}

fn citation_for(packet: &EvidencePacket) -> Citation {
    let mut citation = Citation::unresolved(
        packet.chunk.id.clone(),
        packet.chunk.source_anchor.clone(),
    );
    citation.reference = packet.chunk.refs.first().map(|r| r.reference.clone());
    citation
}

fn entity_refs(listen: &ListenOutput) -> Vec<EntityRef> {
    listen
        .entities
        .iter()
        .map(|e| EntityRef {
            kind: e.kind,
            id: e.id.clone(),
            name_ar: e.name_ar.clone(),
        })
        .collect()
}

/// Post-generation pass: hydration, span resolution, guardrails, chains.
fn finish(
    deps: InterpretDeps<'_>,
    listen: &ListenOutput,
    packets: &[EvidencePacket],
    answer: &mut InterpretedAnswer,
) -> StageResult<InterpretedAnswer> {
    hydrate_citations(answer, listen, packets);
    resolve_citation_spans(deps.resolver, answer, packets);

    let report = deps.guardrails.validate(
        &answer.answer_ar,
        std::mem::take(&mut answer.citations),
        packets,
        listen.intent.kind,
        answer.not_found,
    );
    answer.citations = report.citations;
    answer.reasons.extend(report.issues.iter().cloned());

    match report.verdict {
        GuardrailVerdict::Pass => {}
        GuardrailVerdict::Degrade => {
            answer.outcome_hint = ContractOutcome::PassPartial;
            if answer.confidence == Confidence::High {
                answer.confidence = Confidence::Medium;
            }
        }
        GuardrailVerdict::FailClosed => {
            let mut abstention = Abstention::fail(
                AbstainReason::GuardrailFailure,
                INSUFFICIENT_MESSAGE_AR,
                "guardrail_failure",
            );
            abstention.contract_reasons.extend(report.issues);
            return StageResult::Abstain(abstention);
        }
    }

    answer.argument_chains =
        crate::chains::build_argument_chains(&answer.citations, packets, deps.catalog);

    StageResult::Proceed(answer.clone())
}

/// If the answer lacks citations while claiming success, cite the
/// top-ranked packet of each distinct entity the answer mentions.
/// Stable under repeated application.
fn hydrate_citations(
    answer: &mut InterpretedAnswer,
    listen: &ListenOutput,
    packets: &[EvidencePacket],
) {
    if !answer.citations.is_empty() || answer.not_found {
        return;
    }

    let answer_norm = normalize_for_matching(&answer.answer_ar);
    let mut touched: Vec<&crate::resolver::EntityMatch> = listen
        .entities
        .iter()
        .filter(|e| {
            let name = normalize_for_matching(&e.name_ar);
            !name.is_empty() && answer_norm.contains(&name)
        })
        .collect();
    if touched.is_empty() {
        // No named entity in the answer text: cite the single top packet.
        if let Some(top) = packets.first() {
            answer.citations.push(citation_for(top));
            answer.reasons.push("citations_hydrated".to_string());
        }
        return;
    }
    touched.sort_by(|a, b| a.id.cmp(&b.id));
    touched.dedup_by(|a, b| a.id == b.id);

    let mut seen = HashSet::new();
    for entity in touched {
        let top = packets
            .iter()
            .filter(|p| p.chunk.entity_id == entity.id)
            .max_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.chunk.id.cmp(&a.chunk.id))
            });
        if let Some(packet) = top {
            if seen.insert(packet.chunk.id.clone()) {
                answer.citations.push(citation_for(packet));
            }
        }
    }
    if !answer.citations.is_empty() {
        answer.reasons.push("citations_hydrated".to_string());
    }
}

/// Resolve each citation's span against its chunk text.
fn resolve_citation_spans(
    resolver: &SpanResolver,
    answer: &mut InterpretedAnswer,
    packets: &[EvidencePacket],
) {
    for citation in &mut answer.citations {
        let Some(packet) = packets
            .iter()
            .find(|p| p.chunk.id == citation.chunk_id)
        else {
            continue;
        };
        let resolution = resolver.resolve(&answer.answer_ar, &packet.chunk.text_ar);
        citation.status = resolution.status;
        citation.method = resolution.method;
        if citation.reference.is_none() {
            citation.reference = packet.chunk.refs.first().map(|r| r.reference.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{InterpretOutput, MockModelClient, ModelCitation};
    use crate::resolver::{EntityMatch, MatchKind};
    use crate::schema::{Chunk, Entity, EntityKind, HitSource, Intent, IntentKind, ResolutionStatus};

    const TAZ_DEF: &str = "التزكية هي تطهير النفس من أدرانها وتنميتها بالطاعات.";
    const TAZ_EV: &str = "قال تعالى: قد أفلح من زكاها.";

    fn catalog() -> EntityCatalog {
        EntityCatalog::new(
            vec![
                Entity::new("p1", EntityKind::Pillar, "الروحية", "a"),
                Entity::new("cv1", EntityKind::CoreValue, "التزكية", "a").with_parent("p1"),
            ],
            Vec::new(),
        )
    }

    fn packet(id: &str, kind: ChunkKind, text: &str, score: f64) -> EvidencePacket {
        EvidencePacket {
            chunk: Chunk::new(id, "cv1", EntityKind::CoreValue, kind, text, format!("anchor_{id}")),
            sources: vec![HitSource::EntityExact],
            score,
            vector_rank: None,
            edge: None,
        }
    }

    fn listen() -> ListenOutput {
        ListenOutput {
            normalized_question: "عرف التزكيه".to_string(),
            listen_summary_ar: String::new(),
            keywords: vec!["التزكيه".to_string()],
            entities: vec![EntityMatch {
                kind: EntityKind::CoreValue,
                id: "cv1".into(),
                name_ar: "التزكية".to_string(),
                confidence: 1.0,
                match_kind: MatchKind::Exact,
            }],
            intent: Intent {
                kind: IntentKind::Definition,
                in_scope: true,
                confidence: 0.8,
                target_entity: Some("cv1".into()),
            },
        }
    }

    fn packets() -> Vec<EvidencePacket> {
        vec![
            packet("ch_def", ChunkKind::Definition, TAZ_DEF, 3.0),
            packet("ch_ev", ChunkKind::Evidence, TAZ_EV, 2.0),
        ]
    }

    fn guardrails() -> Guardrails {
        Guardrails::default()
    }

    fn resolver() -> SpanResolver {
        SpanResolver::default()
    }

    #[tokio::test]
    async fn fallback_builds_two_section_answer() {
        let g = guardrails();
        let r = resolver();
        let catalog = catalog();
        let deps = InterpretDeps {
            catalog: &catalog,
            model: None,
            model_deadline: Duration::from_secs(1),
            guardrails: &g,
            resolver: &r,
        };
        let result = run_interpret(deps, "عرّف التزكية", Mode::Answer, &listen(), &packets()).await;
        let StageResult::Proceed(answer) = result else {
            panic!("expected fallback answer");
        };
        assert!(answer.answer_ar.contains("التعريف:"));
        assert!(answer.answer_ar.contains("الدليل/التأصيل:"));
        assert_eq!(answer.citations.len(), 2);
        // Verbatim chunk text resolves exactly.
        assert!(answer
            .citations
            .iter()
            .all(|c| c.status == ResolutionStatus::Resolved));
        assert_eq!(answer.outcome_hint, ContractOutcome::PassFull);
    }

    #[tokio::test]
    async fn model_answer_with_unknown_citation_gets_it_dropped() {
        let model: Arc<dyn ModelClient> = Arc::new(MockModelClient::new().with_interpret(
            InterpretOutput {
                answer_ar: TAZ_DEF.to_string(),
                citations: vec![
                    ModelCitation {
                        chunk_id: "ch_def".to_string(),
                        source_anchor: "anchor_ch_def".to_string(),
                        reference: None,
                    },
                    ModelCitation {
                        chunk_id: "ghost".to_string(),
                        source_anchor: "nowhere".to_string(),
                        reference: None,
                    },
                ],
                entities: vec!["التزكية".to_string()],
                not_found: false,
                confidence: Confidence::High,
            },
        ));
        let g = guardrails();
        let r = resolver();
        let catalog = catalog();
        let deps = InterpretDeps {
            catalog: &catalog,
            model: Some(&model),
            model_deadline: Duration::from_secs(1),
            guardrails: &g,
            resolver: &r,
        };
        let result = run_interpret(deps, "عرّف التزكية", Mode::Answer, &listen(), &packets()).await;
        let StageResult::Proceed(answer) = result else {
            panic!("expected answer");
        };
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].chunk_id.as_str(), "ch_def");
        // Dropping an invalid citation is an issue, so the outcome degrades.
        assert_eq!(answer.outcome_hint, ContractOutcome::PassPartial);
    }

    #[tokio::test]
    async fn model_omitting_citations_triggers_hydration() {
        let model: Arc<dyn ModelClient> = Arc::new(MockModelClient::new().with_interpret(
            InterpretOutput {
                answer_ar: TAZ_DEF.to_string(),
                citations: vec![],
                entities: vec!["التزكية".to_string()],
                not_found: false,
                confidence: Confidence::High,
            },
        ));
        let g = guardrails();
        let r = resolver();
        let catalog = catalog();
        let deps = InterpretDeps {
            catalog: &catalog,
            model: Some(&model),
            model_deadline: Duration::from_secs(1),
            guardrails: &g,
            resolver: &r,
        };
        let result = run_interpret(deps, "عرّف التزكية", Mode::Answer, &listen(), &packets()).await;
        let StageResult::Proceed(answer) = result else {
            panic!("expected answer");
        };
        assert!(!answer.citations.is_empty());
        assert_eq!(answer.citations[0].chunk_id.as_str(), "ch_def");
        assert!(answer.reasons.iter().any(|r| r == "citations_hydrated"));
    }

    #[tokio::test]
    async fn model_refusal_becomes_abstention() {
        let model: Arc<dyn ModelClient> = Arc::new(MockModelClient::new().with_interpret(
            InterpretOutput {
                answer_ar: String::new(),
                citations: vec![],
                entities: vec![],
                not_found: true,
                confidence: Confidence::Low,
            },
        ));
        let g = guardrails();
        let r = resolver();
        let catalog = catalog();
        let deps = InterpretDeps {
            catalog: &catalog,
            model: Some(&model),
            model_deadline: Duration::from_secs(1),
            guardrails: &g,
            resolver: &r,
        };
        let result = run_interpret(deps, "سؤال", Mode::Answer, &listen(), &packets()).await;
        assert!(matches!(result, StageResult::Abstain(_)));
    }

    #[tokio::test]
    async fn unsupported_definitional_answer_fails_closed() {
        // Model invents a definition the evidence does not contain.
        let model: Arc<dyn ModelClient> = Arc::new(MockModelClient::new().with_interpret(
            InterpretOutput {
                answer_ar: "التزكية هي رياضة بدنية صباحية منتظمة للجسد".to_string(),
                citations: vec![ModelCitation {
                    chunk_id: "ch_def".to_string(),
                    source_anchor: "anchor_ch_def".to_string(),
                    reference: None,
                }],
                entities: vec!["التزكية".to_string()],
                not_found: false,
                confidence: Confidence::High,
            },
        ));
        let g = guardrails();
        let r = resolver();
        let catalog = catalog();
        let deps = InterpretDeps {
            catalog: &catalog,
            model: Some(&model),
            model_deadline: Duration::from_secs(1),
            guardrails: &g,
            resolver: &r,
        };
        let result = run_interpret(deps, "عرّف التزكية", Mode::Answer, &listen(), &packets()).await;
        let StageResult::Abstain(abstention) = result else {
            panic!("expected fail-closed abstention");
        };
        assert_eq!(abstention.reason, AbstainReason::GuardrailFailure);
    }

    #[tokio::test]
    async fn no_definition_packet_and_no_model_abstains() {
        let g = guardrails();
        let r = resolver();
        let catalog = catalog();
        let deps = InterpretDeps {
            catalog: &catalog,
            model: None,
            model_deadline: Duration::from_secs(1),
            guardrails: &g,
            resolver: &r,
        };
        let only_evidence = vec![packet("ch_ev", ChunkKind::Evidence, TAZ_EV, 2.0)];
        let result =
            run_interpret(deps, "عرّف التزكية", Mode::Answer, &listen(), &only_evidence).await;
        let StageResult::Abstain(abstention) = result else {
            panic!("expected abstention");
        };
        assert_eq!(abstention.reason, AbstainReason::ModelUnavailable);
    }
}
