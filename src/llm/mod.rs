//! Model client seam.
//!
//! Defines the schema-constrained calls the pipeline makes against the
//! foundation-model provider. Two implementations ship with the crate:
//! the scripted `MockModelClient` for tests and offline operation, and
//! whatever provider adapter the deployment wires in. The engine treats a
//! missing client as "model unavailable" and falls back deterministically.

mod outputs;
pub mod prompts;

pub use outputs::{
    output_schema, IntentOutput, IntentRequest, InterpretOutput, InterpretRequest, ModelCitation,
    PurposePathOutput, PurposePathRequest, RewriteOutput, RewriteRequest,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Errors from model calls. A schema violation is a model failure; the
/// pipeline never consumes partially valid output.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model not available: {0}")]
    Unavailable(String),

    #[error("model call timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("output violated schema: {0}")]
    SchemaViolation(String),
}

/// Parse a raw model response against its declared schema.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, ModelError> {
    serde_json::from_str(raw).map_err(|e| ModelError::SchemaViolation(e.to_string()))
}

/// The four schema-constrained calls the pipeline makes.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn purpose_path(
        &self,
        request: PurposePathRequest,
    ) -> Result<PurposePathOutput, ModelError>;

    async fn rewrite_query(&self, request: RewriteRequest) -> Result<RewriteOutput, ModelError>;

    async fn classify_intent(&self, request: IntentRequest) -> Result<IntentOutput, ModelError>;

    async fn interpret(&self, request: InterpretRequest) -> Result<InterpretOutput, ModelError>;
}

// ---------------------------------------------------------------------------
// Mock client
// ---------------------------------------------------------------------------

type Scripted<T> = Mutex<Vec<Result<T, ModelError>>>;

/// Scripted client for tests. Each call pops the next scripted response
/// for its method; an empty script answers `Unavailable`.
#[derive(Default)]
pub struct MockModelClient {
    purpose: Scripted<PurposePathOutput>,
    rewrite: Scripted<RewriteOutput>,
    intent: Scripted<IntentOutput>,
    interpret: Scripted<InterpretOutput>,
    /// Artificial latency before every response, for deadline tests.
    delay: Option<Duration>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purpose(self, output: PurposePathOutput) -> Self {
        self.purpose.lock().unwrap().push(Ok(output));
        self
    }

    pub fn with_rewrite(self, output: RewriteOutput) -> Self {
        self.rewrite.lock().unwrap().push(Ok(output));
        self
    }

    pub fn with_intent(self, output: IntentOutput) -> Self {
        self.intent.lock().unwrap().push(Ok(output));
        self
    }

    pub fn with_interpret(self, output: InterpretOutput) -> Self {
        self.interpret.lock().unwrap().push(Ok(output));
        self
    }

    pub fn with_interpret_error(self, error: ModelError) -> Self {
        self.interpret.lock().unwrap().push(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn next<T: Clone>(&self, script: &Scripted<T>) -> Result<T, ModelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut queue = script.lock().unwrap();
        if queue.is_empty() {
            return Err(ModelError::Unavailable("no scripted response".to_string()));
        }
        queue.remove(0)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn purpose_path(
        &self,
        _request: PurposePathRequest,
    ) -> Result<PurposePathOutput, ModelError> {
        self.next(&self.purpose).await
    }

    async fn rewrite_query(&self, _request: RewriteRequest) -> Result<RewriteOutput, ModelError> {
        self.next(&self.rewrite).await
    }

    async fn classify_intent(&self, _request: IntentRequest) -> Result<IntentOutput, ModelError> {
        self.next(&self.intent).await
    }

    async fn interpret(&self, _request: InterpretRequest) -> Result<InterpretOutput, ModelError> {
        self.next(&self.interpret).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Confidence;

    fn interpret_output() -> InterpretOutput {
        InterpretOutput {
            answer_ar: "جواب".to_string(),
            citations: vec![],
            entities: vec![],
            not_found: false,
            confidence: Confidence::Medium,
        }
    }

    #[tokio::test]
    async fn mock_pops_scripted_responses_in_order() {
        let client = MockModelClient::new()
            .with_interpret(interpret_output())
            .with_interpret_error(ModelError::Transport("down".to_string()));

        let request = InterpretRequest {
            question: "سؤال".to_string(),
            evidence_packets: vec![],
            entities: vec![],
            mode: crate::schema::Mode::Answer,
        };

        assert!(client.interpret(request.clone()).await.is_ok());
        assert!(matches!(
            client.interpret(request.clone()).await,
            Err(ModelError::Transport(_))
        ));
        // Script exhausted
        assert!(matches!(
            client.interpret(request).await,
            Err(ModelError::Unavailable(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_schema_violation() {
        let result = parse_structured::<InterpretOutput>("{\"answer_ar\": 5}");
        assert!(matches!(result, Err(ModelError::SchemaViolation(_))));
    }
}
