//! The Muḥāsibī pipeline: an 8-stage deterministic state machine.
//!
//! Stage order is strict and sequential. Each stage is a function over the
//! immutable outputs of prior stages; the orchestrator merges stage
//! outputs into the request context, records one trace snapshot per
//! stage, and jumps straight to FINALIZE on any abstention.

pub mod account;
pub mod context;
pub mod finalize;
pub mod interpret;
pub mod listen;
pub mod path;
pub mod purpose;
pub mod reflect;
pub mod structure;

use crate::catalog::EntityCatalog;
use crate::config::EngineConfig;
use crate::guardrails::Guardrails;
use crate::llm::ModelClient;
use crate::resolver::EntityResolver;
use crate::retrieve::{EvidenceStore, HybridRetriever};
use crate::schema::{
    AbstainReason, ContractOutcome, Difficulty, EntityRef, FinalResponse, Purpose,
    MANDATORY_CONSTRAINTS,
};
use crate::spans::SpanResolver;
use crate::trace::{StageName, TraceBundle, TraceCounts};
use context::{AccountDecision, Abstention, RequestContext, StageResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub response: FinalResponse,
    pub timings: HashMap<String, f64>,
    /// Retrieval counters: packet count, per-source counts, rewrites.
    pub retrieval_trace: serde_json::Value,
}

/// The stage orchestrator. One instance serves many concurrent requests;
/// all shared state is read-only.
pub struct Pipeline {
    catalog: Arc<EntityCatalog>,
    resolver: EntityResolver,
    retriever: HybridRetriever,
    model: Option<Arc<dyn ModelClient>>,
    guardrails: Guardrails,
    span_resolver: SpanResolver,
    config: EngineConfig,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<EntityCatalog>,
        store: Arc<dyn EvidenceStore>,
        model: Option<Arc<dyn ModelClient>>,
        config: EngineConfig,
    ) -> Self {
        let resolver = EntityResolver::new(Arc::clone(&catalog));
        let retriever = HybridRetriever::new(
            store,
            model.clone(),
            config.retrieval.clone(),
            config.timeouts,
        );
        Self {
            catalog,
            resolver,
            retriever,
            model,
            guardrails: Guardrails::default(),
            span_resolver: SpanResolver::default(),
            config,
        }
    }

    /// Run the full pipeline for one request. The trace is written through
    /// a shared handle so the caller keeps whatever was recorded even if
    /// this future is dropped at the total deadline.
    pub async fn run(
        &self,
        ctx: &mut RequestContext,
        trace: &Mutex<TraceBundle>,
    ) -> PipelineRun {
        let mut timings: HashMap<String, f64> = HashMap::new();

        // Malformed input fails before any stage work. LISTEN is still
        // recorded (empty) so the trace starts at the canonical first
        // stage.
        if ctx.question.trim().is_empty() {
            self.record(
                trace,
                ctx,
                &mut timings,
                StageName::Listen,
                Instant::now(),
                TraceCounts {
                    entities: Some(0),
                    keywords: Some(0),
                    ..Default::default()
                },
                vec!["input_malformed".to_string()],
            );
            let error = crate::error::EngineError::InputMalformed("empty question".to_string());
            let abstention = Abstention::fail(
                error.abstain_reason(),
                finalize::GENERIC_REFUSAL_AR,
                error.reason_code(),
            );
            let response = self.finish_with_refusal(ctx, trace, &mut timings, abstention);
            return PipelineRun {
                response,
                timings,
                retrieval_trace: serde_json::json!({}),
            };
        }

        // LISTEN
        let started = Instant::now();
        let listen = listen::run_listen(
            &self.resolver,
            &self.config.account,
            self.model.as_ref(),
            self.config.timeouts.model,
            &ctx.question,
        )
        .await;
        self.record(
            trace,
            ctx,
            &mut timings,
            StageName::Listen,
            started,
            TraceCounts {
                entities: Some(listen.entities.len()),
                keywords: Some(listen.keywords.len()),
                ..Default::default()
            },
            vec![],
        );
        ctx.listen = Some(listen);

        // PURPOSE
        let started = Instant::now();
        let purpose = purpose::run_purpose(
            self.model.as_ref(),
            self.config.timeouts.model,
            &ctx.question,
            ctx.listen(),
        )
        .await;
        let purpose_issues = if purpose.fallback {
            vec!["model_fallback".to_string()]
        } else {
            vec![]
        };
        self.record(
            trace,
            ctx,
            &mut timings,
            StageName::Purpose,
            started,
            TraceCounts::default(),
            purpose_issues,
        );
        ctx.purpose = Some(purpose);

        // PATH
        let started = Instant::now();
        let path = path::run_path(ctx.listen(), ctx.purpose.as_ref().unwrap());
        self.record(
            trace,
            ctx,
            &mut timings,
            StageName::Path,
            started,
            TraceCounts::default(),
            vec![],
        );
        ctx.path = Some(path);

        // RETRIEVE
        let started = Instant::now();
        let listen_ref = ctx.listen();
        let retrieval = self
            .retriever
            .retrieve(
                &listen_ref.normalized_question,
                &listen_ref.entities,
                &listen_ref.keywords,
            )
            .await;
        let mut retrieve_issues = Vec::new();
        if !retrieval.rewrites_used.is_empty() {
            retrieve_issues.push(format!("rewrites:{}", retrieval.rewrites_used.len()));
        }
        if retrieval.disambiguation_ar.is_some() {
            retrieve_issues.push("disambiguation_offered".to_string());
        }
        self.record(
            trace,
            ctx,
            &mut timings,
            StageName::Retrieve,
            started,
            TraceCounts {
                packets: Some(retrieval.packets.len()),
                ..Default::default()
            },
            retrieve_issues,
        );
        let retrieval_trace = retrieval_counters(&retrieval);
        ctx.retrieval = Some(retrieval);

        // ACCOUNT
        let started = Instant::now();
        let account = account::run_account(&self.config.account, ctx.listen(), ctx.packets());
        self.record(
            trace,
            ctx,
            &mut timings,
            StageName::Account,
            started,
            TraceCounts {
                packets: Some(ctx.packets().len()),
                not_found: Some(account.decision != AccountDecision::Sufficient),
                ..Default::default()
            },
            account.issues.clone(),
        );

        let abstention = match &account.decision {
            AccountDecision::Sufficient => None,
            AccountDecision::InsufficientRefuse => Some(Abstention {
                reason: AbstainReason::InsufficientEvidence,
                message_ar: account::INSUFFICIENT_MESSAGE_AR.to_string(),
                suggestion_ar: None,
                contract_reasons: account.reasons.clone(),
                outcome: ContractOutcome::PassPartial,
            }),
            AccountDecision::OutOfScopeRefuse { suggestion_ar } => Some(Abstention {
                reason: AbstainReason::OutOfScope,
                message_ar: if suggestion_ar.is_some() {
                    account::FIQH_MESSAGE_AR.to_string()
                } else {
                    account::OUT_OF_SCOPE_MESSAGE_AR.to_string()
                },
                suggestion_ar: suggestion_ar.clone(),
                contract_reasons: account.reasons.clone(),
                outcome: ContractOutcome::PassPartial,
            }),
        };
        ctx.account = Some(account);

        if let Some(abstention) = abstention {
            let response = self.finish_with_refusal(ctx, trace, &mut timings, abstention);
            return PipelineRun {
                response,
                timings,
                retrieval_trace,
            };
        }

        // INTERPRET
        let started = Instant::now();
        let deps = interpret::InterpretDeps {
            catalog: &self.catalog,
            model: self.model.as_ref(),
            model_deadline: self.config.timeouts.model,
            guardrails: &self.guardrails,
            resolver: &self.span_resolver,
        };
        let interpreted = interpret::run_interpret(
            deps,
            &ctx.question,
            ctx.mode,
            ctx.listen(),
            ctx.packets(),
        )
        .await;

        let answer = match interpreted {
            StageResult::Proceed(answer) => {
                self.record(
                    trace,
                    ctx,
                    &mut timings,
                    StageName::Interpret,
                    started,
                    TraceCounts {
                        citations: Some(answer.citations.len()),
                        not_found: Some(answer.not_found),
                        confidence: Some(answer.confidence),
                        ..Default::default()
                    },
                    answer.reasons.clone(),
                );
                answer
            }
            StageResult::Abstain(abstention) => {
                self.record(
                    trace,
                    ctx,
                    &mut timings,
                    StageName::Interpret,
                    started,
                    TraceCounts {
                        citations: Some(0),
                        not_found: Some(true),
                        ..Default::default()
                    },
                    abstention.contract_reasons.clone(),
                );
                let response = self.finish_with_refusal(ctx, trace, &mut timings, abstention);
                return PipelineRun {
                    response,
                    timings,
                    retrieval_trace,
                };
            }
        };
        ctx.interpret = Some(answer);

        // REFLECT
        let started = Instant::now();
        let reflected = reflect::run_reflect(
            ctx.mode,
            ctx.interpret.as_ref().unwrap(),
            ctx.packets(),
        );
        let reflect_issues = if reflected.annotation_added {
            vec!["annotation_added".to_string()]
        } else {
            vec![]
        };
        self.record(
            trace,
            ctx,
            &mut timings,
            StageName::Reflect,
            started,
            TraceCounts::default(),
            reflect_issues,
        );
        ctx.reflect = Some(reflected);

        // FINALIZE
        let started = Instant::now();
        let response = self.assemble(ctx);
        let valid_ids: HashSet<String> = ctx
            .packets()
            .iter()
            .map(|p| p.chunk.id.as_str().to_string())
            .collect();
        let response = finalize::enforce_invariants(response, &valid_ids);
        self.record(
            trace,
            ctx,
            &mut timings,
            StageName::Finalize,
            started,
            TraceCounts {
                citations: Some(response.citations.len()),
                not_found: Some(response.not_found),
                confidence: Some(response.confidence),
                ..Default::default()
            },
            response.contract_reasons.clone(),
        );

        info!(
            request = %ctx.request_id,
            outcome = ?response.contract_outcome,
            not_found = response.not_found,
            "request finalized"
        );

        PipelineRun {
            response,
            timings,
            retrieval_trace,
        }
    }

    /// Assemble the response from the stage outputs.
    fn assemble(&self, ctx: &RequestContext) -> FinalResponse {
        let listen = ctx.listen();
        let purpose = ctx
            .purpose
            .as_ref()
            .map(|p| p.purpose.clone())
            .unwrap_or_else(default_purpose);
        let path = ctx.path.as_ref();
        let interpret = ctx.interpret.as_ref().expect("INTERPRET ran");
        let answer_ar = ctx
            .reflect
            .as_ref()
            .map(|r| r.answer_ar.clone())
            .unwrap_or_else(|| interpret.answer_ar.clone());

        FinalResponse {
            listen_summary_ar: listen.listen_summary_ar.clone(),
            purpose,
            path_plan_ar: path.map(|p| p.plan_ar.clone()).unwrap_or_default(),
            answer_ar,
            citations: interpret.citations.clone(),
            entities: interpret.entities.clone(),
            difficulty: path.map(|p| p.difficulty).unwrap_or(Difficulty::Medium),
            not_found: interpret.not_found,
            confidence: interpret.confidence,
            contract_outcome: interpret.outcome_hint,
            contract_reasons: interpret.reasons.clone(),
            abstain_reason: interpret.abstain_reason,
            refusal_suggestion_ar: None,
            argument_chains: interpret.argument_chains.clone(),
        }
    }

    /// Jump to FINALIZE with a refusal, recording the FINALIZE snapshot.
    fn finish_with_refusal(
        &self,
        ctx: &RequestContext,
        trace: &Mutex<TraceBundle>,
        timings: &mut HashMap<String, f64>,
        abstention: Abstention,
    ) -> FinalResponse {
        let started = Instant::now();

        let (summary, entities): (String, Vec<EntityRef>) = match &ctx.listen {
            Some(listen) => (
                listen.listen_summary_ar.clone(),
                listen
                    .entities
                    .iter()
                    .map(|e| EntityRef {
                        kind: e.kind,
                        id: e.id.clone(),
                        name_ar: e.name_ar.clone(),
                    })
                    .collect(),
            ),
            None => (String::new(), Vec::new()),
        };
        let purpose = ctx
            .purpose
            .as_ref()
            .map(|p| p.purpose.clone())
            .unwrap_or_else(default_purpose);
        let plan = ctx
            .path
            .as_ref()
            .map(|p| p.plan_ar.clone())
            .unwrap_or_else(path::default_plan);
        let difficulty = ctx
            .path
            .as_ref()
            .map(|p| p.difficulty)
            .unwrap_or(Difficulty::Hard);

        let response =
            finalize::refusal_response(&abstention, summary, purpose, plan, difficulty, entities);
        let valid_ids = HashSet::new();
        let response = finalize::enforce_invariants(response, &valid_ids);

        self.record(
            trace,
            ctx,
            timings,
            StageName::Finalize,
            started,
            TraceCounts {
                citations: Some(0),
                not_found: Some(true),
                confidence: Some(response.confidence),
                ..Default::default()
            },
            response.contract_reasons.clone(),
        );
        response
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        trace: &Mutex<TraceBundle>,
        ctx: &RequestContext,
        timings: &mut HashMap<String, f64>,
        stage: StageName,
        started: Instant,
        counts: TraceCounts,
        issues: Vec<String>,
    ) {
        let elapsed_s = started.elapsed().as_secs_f64();
        timings.insert(stage.as_str().to_string(), elapsed_s);
        if let Ok(mut bundle) = trace.lock() {
            bundle.record(stage, ctx.mode, &ctx.language, elapsed_s, counts, issues);
        }
    }
}

fn default_purpose() -> Purpose {
    Purpose {
        goal_ar: "الإجابة عن السؤال من الأدلة المعتمدة فقط".to_string(),
        constraints: MANDATORY_CONSTRAINTS.iter().map(|c| c.to_string()).collect(),
    }
}

/// Build a deadline-exceeded refusal without pipeline state.
pub fn deadline_refusal() -> FinalResponse {
    FinalResponse {
        listen_summary_ar: String::new(),
        purpose: default_purpose(),
        path_plan_ar: path::default_plan(),
        answer_ar: "تعذر إكمال المعالجة ضمن المهلة المحددة.".to_string(),
        citations: Vec::new(),
        entities: Vec::new(),
        difficulty: Difficulty::Hard,
        not_found: true,
        confidence: crate::schema::Confidence::Low,
        contract_outcome: ContractOutcome::Fail,
        contract_reasons: vec!["deadline_exceeded".to_string()],
        abstain_reason: Some(AbstainReason::DeadlineExceeded),
        refusal_suggestion_ar: None,
        argument_chains: Vec::new(),
    }
}

fn retrieval_counters(outcome: &context::RetrievalOutcome) -> serde_json::Value {
    use crate::schema::HitSource;
    let count_source = |s: HitSource| {
        outcome
            .packets
            .iter()
            .filter(|p| p.from_source(s))
            .count()
    };
    serde_json::json!({
        "packets": outcome.packets.len(),
        "entity_exact": count_source(HitSource::EntityExact),
        "vector": count_source(HitSource::Vector),
        "graph_expand": count_source(HitSource::GraphExpand),
        "rewrites": outcome.rewrites_used.len(),
        "disambiguation_offered": outcome.disambiguation_ar.is_some(),
    })
}
