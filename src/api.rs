//! Transport-independent engine surface.
//!
//! `Engine` is the single entry point for consumers: `ask` runs the full
//! pipeline under the total deadline, `trace_bundle` returns the audit
//! trace for a finished request, and `feedback` appends a rating to the
//! run log. Transports (HTTP, CLI, direct embedding) call these methods
//! and never reach into the pipeline directly.

use crate::catalog::EntityCatalog;
use crate::config::EngineConfig;
use crate::llm::ModelClient;
use crate::pipeline::context::RequestContext;
use crate::pipeline::{deadline_refusal, Pipeline};
use crate::retrieve::EvidenceStore;
use crate::schema::{Feedback, FinalResponse, Mode};
use crate::storage::{RunRecord, RunStore, StorageResult};
use crate::trace::TraceBundle;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

/// A question for the engine. Language defaults to Arabic, mode to the
/// configured default.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub language: Option<String>,
    pub mode: Option<Mode>,
    /// Reasoning engine selector. This build ships one engine
    /// ("muhasibi"); the field is recorded with the run inputs.
    pub engine: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            language: None,
            mode: None,
            engine: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// The response plus the id under which its trace is retrievable.
#[derive(Debug, Clone)]
pub struct AskResponse {
    pub request_id: Uuid,
    pub response: FinalResponse,
}

/// The evidence-only answering engine.
pub struct Engine {
    pipeline: Pipeline,
    config: EngineConfig,
    run_store: Option<Arc<dyn RunStore>>,
    traces: DashMap<Uuid, TraceBundle>,
}

impl Engine {
    pub fn new(
        catalog: Arc<EntityCatalog>,
        store: Arc<dyn EvidenceStore>,
        model: Option<Arc<dyn ModelClient>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(catalog, store, model, config.clone()),
            config,
            run_store: None,
            traces: DashMap::new(),
        }
    }

    /// Persist runs and feedback to the given append-only store.
    pub fn with_run_store(mut self, run_store: Arc<dyn RunStore>) -> Self {
        self.run_store = Some(run_store);
        self
    }

    /// Process a question through the full pipeline.
    ///
    /// The total deadline always yields a response: on breach the partial
    /// trace is kept and a `deadline_exceeded` refusal is returned. A
    /// caller dropping this future cancels cleanly; nothing is persisted
    /// for a cancelled request.
    pub async fn ask(&self, request: AskRequest) -> AskResponse {
        let language = request.language.unwrap_or_else(|| "ar".to_string());
        let mode = request.mode.unwrap_or(self.config.default_mode);
        let mut ctx = RequestContext::new(request.question.clone(), language.clone(), mode);
        let request_id = ctx.request_id;

        let trace = Mutex::new(TraceBundle::new(request_id));

        let run = tokio::time::timeout(
            self.config.timeouts.total,
            self.pipeline.run(&mut ctx, &trace),
        )
        .await;

        let (response, timings, retrieval_trace) = match run {
            Ok(run) => (run.response, run.timings, run.retrieval_trace),
            Err(_) => {
                warn!(request = %request_id, "total deadline exceeded");
                (
                    deadline_refusal(),
                    Default::default(),
                    serde_json::json!({}),
                )
            }
        };

        let bundle = trace.into_inner().unwrap_or_else(|e| e.into_inner());
        self.traces.insert(request_id, bundle.clone());

        if let Some(run_store) = &self.run_store {
            let record = RunRecord {
                request_id,
                created_at: chrono::Utc::now(),
                inputs: serde_json::json!({
                    "question": request.question,
                    "language": language,
                    "mode": mode.as_str(),
                    "engine": request.engine.as_deref().unwrap_or("muhasibi"),
                }),
                response: response.clone(),
                retrieval_trace,
                state_trace: bundle,
                timings,
            };
            if let Err(e) = run_store.append_run(record).await {
                warn!(request = %request_id, error = %e, "run append failed");
            }
        }

        AskResponse {
            request_id,
            response,
        }
    }

    /// The audit trace of a completed request.
    pub fn trace_bundle(&self, request_id: &Uuid) -> Option<TraceBundle> {
        self.traces.get(request_id).map(|t| t.clone())
    }

    /// Append user feedback for a completed request. Ratings outside
    /// {-1, 0, 1} are clamped.
    pub async fn feedback(
        &self,
        request_id: Uuid,
        rating: i8,
        tags: Vec<String>,
        comment: Option<String>,
    ) -> StorageResult<()> {
        let Some(run_store) = &self.run_store else {
            return Ok(());
        };
        run_store
            .append_feedback(Feedback {
                request_id,
                rating: rating.clamp(-1, 1),
                tags,
                comment,
                created_at: chrono::Utc::now(),
            })
            .await
    }
}
