//! Contract-level properties exercised through the public engine surface:
//! refusal taxonomy, trace shape and redaction, deadlines, and the
//! append-only run log.

mod common;

use common::fixtures::{engine_with, seeded_store, FailingStore, TAZKIYA_DEF};
use muhasibi::llm::{InterpretOutput, ModelCitation};
use muhasibi::trace::{render_trace, StageName};
use muhasibi::{
    AbstainReason, AskRequest, Confidence, ContractOutcome, Engine, EngineConfig,
    MockModelClient, ModelClient, ModelError,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn empty_question_fails_with_input_malformed() {
    let engine = engine_with(None);
    let response = engine.ask(AskRequest::new("   ")).await.response;

    assert!(response.not_found);
    assert_eq!(response.abstain_reason, Some(AbstainReason::InputMalformed));
    assert_eq!(response.contract_outcome, ContractOutcome::Fail);
    assert!(response.citations.is_empty());
}

#[tokio::test]
async fn retrieval_outage_degrades_to_insufficient_refusal() {
    let store = seeded_store();
    let catalog = Arc::new(store.load_catalog().unwrap());
    let engine = Engine::new(
        catalog,
        Arc::new(FailingStore),
        None,
        EngineConfig::default(),
    );

    let response = engine
        .ask(AskRequest::new("عرّف التزكية كما ورد في الإطار"))
        .await
        .response;

    assert!(response.not_found);
    assert_eq!(
        response.abstain_reason,
        Some(AbstainReason::InsufficientEvidence)
    );
    assert!(response.citations.is_empty());
}

#[tokio::test]
async fn model_outage_falls_back_to_deterministic_answer() {
    let model: Arc<dyn ModelClient> = Arc::new(
        MockModelClient::new()
            .with_interpret_error(ModelError::Transport("provider down".to_string())),
    );
    let engine = engine_with(Some(model));

    let response = engine
        .ask(AskRequest::new("عرّف التزكية كما ورد في الإطار"))
        .await
        .response;

    assert!(!response.not_found);
    assert!(response.answer_ar.contains("التعريف"));
    assert!(!response.citations.is_empty());
}

#[tokio::test]
async fn slow_model_is_cut_by_total_deadline() {
    let mut config = EngineConfig::default();
    config.timeouts.total = Duration::from_millis(200);
    // Per-call model deadline longer than the total: the total wins.
    config.timeouts.model = Duration::from_secs(5);

    let model: Arc<dyn ModelClient> = Arc::new(
        MockModelClient::new()
            .with_delay(Duration::from_secs(2))
            .with_interpret(InterpretOutput {
                answer_ar: TAZKIYA_DEF.to_string(),
                citations: vec![ModelCitation {
                    chunk_id: "taz_def".to_string(),
                    source_anchor: "anchor_taz_def".to_string(),
                    reference: None,
                }],
                entities: vec![],
                not_found: false,
                confidence: Confidence::High,
            }),
    );
    let store = seeded_store();
    let catalog = Arc::new(store.load_catalog().unwrap());
    let engine = Engine::new(catalog, store, Some(model), config);

    let response = engine
        .ask(AskRequest::new("عرّف التزكية كما ورد في الإطار"))
        .await
        .response;

    assert!(response.not_found);
    assert_eq!(response.abstain_reason, Some(AbstainReason::DeadlineExceeded));
    assert_eq!(response.contract_outcome, ContractOutcome::Fail);
    assert!(response
        .contract_reasons
        .iter()
        .any(|r| r == "deadline_exceeded"));
}

#[tokio::test]
async fn trace_follows_stage_order_and_redacts_content() {
    let engine = engine_with(None);
    let result = engine
        .ask(AskRequest::new("عرّف التزكية كما ورد في الإطار"))
        .await;

    let bundle = engine
        .trace_bundle(&result.request_id)
        .expect("trace retrievable by request id");

    assert!(bundle.is_order_valid());
    assert_eq!(bundle.states.first().unwrap().state, StageName::Listen);
    assert_eq!(bundle.states.last().unwrap().state, StageName::Finalize);

    // Counts are present, chunk contents are not.
    let rendered = render_trace(&bundle).to_string();
    assert!(!rendered.contains("تطهير النفس"));
    assert!(!rendered.contains(TAZKIYA_DEF));

    // Rendering is pure.
    assert_eq!(render_trace(&bundle), render_trace(&bundle));
}

#[tokio::test]
async fn refusal_trace_jumps_from_account_to_finalize() {
    let engine = engine_with(None);
    let result = engine.ask(AskRequest::new("ما حكم صيام يوم الجمعة؟")).await;
    let bundle = engine.trace_bundle(&result.request_id).unwrap();

    assert!(bundle.is_order_valid());
    let states: Vec<StageName> = bundle.states.iter().map(|s| s.state).collect();
    assert!(states.contains(&StageName::Account));
    assert!(!states.contains(&StageName::Interpret));
    assert_eq!(*states.last().unwrap(), StageName::Finalize);
}

#[tokio::test]
async fn runs_and_feedback_are_persisted() {
    let store = seeded_store();
    let catalog = Arc::new(store.load_catalog().unwrap());
    let engine = Engine::new(
        catalog,
        store.clone(),
        None,
        EngineConfig::default(),
    )
    .with_run_store(store);

    let result = engine
        .ask(AskRequest::new("ما هي ركائز الحياة الطيبة الخمس؟"))
        .await;
    assert!(!result.response.not_found);

    engine
        .feedback(result.request_id, 1, vec!["دقيق".to_string()], None)
        .await
        .expect("feedback appended");

    // Ratings outside the contract range are clamped, not rejected.
    engine
        .feedback(result.request_id, 5, vec![], Some("جيد".to_string()))
        .await
        .expect("clamped feedback appended");
}

#[tokio::test]
async fn successful_answers_always_carry_citations() {
    let engine = engine_with(None);
    for question in [
        "ما هي ركائز الحياة الطيبة الخمس؟",
        "عرّف التزكية كما ورد في الإطار",
        "قارن بين التزكية والمراقبة من حيث الأثر على الحياة الروحية.",
    ] {
        let response = engine.ask(AskRequest::new(question)).await.response;
        if !response.not_found {
            assert!(
                !response.citations.is_empty(),
                "uncited success for: {question}"
            );
        }
    }
}

#[tokio::test]
async fn fiqh_question_never_answers_even_with_scripted_model() {
    // A model willing to answer must not defeat the scope gate.
    let model: Arc<dyn ModelClient> = Arc::new(MockModelClient::new().with_interpret(
        InterpretOutput {
            answer_ar: "يجوز ذلك".to_string(),
            citations: vec![],
            entities: vec![],
            not_found: false,
            confidence: Confidence::High,
        },
    ));
    let engine = engine_with(Some(model));
    let response = engine
        .ask(AskRequest::new("ما حكم صيام يوم الجمعة؟"))
        .await
        .response;

    assert!(response.not_found);
    assert!(response.citations.is_empty());
}
