//! Storage trait definitions.

use crate::schema::{Feedback, FinalResponse};
use crate::trace::TraceBundle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One completed request, persisted at FINALIZE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Request inputs (question, language, mode).
    pub inputs: serde_json::Value,
    pub response: FinalResponse,
    /// Retrieval counters (leg sizes, rewrites). Counts only.
    pub retrieval_trace: serde_json::Value,
    pub state_trace: TraceBundle,
    /// Per-stage elapsed seconds.
    pub timings: HashMap<String, f64>,
}

/// Append-only persistence of request runs and user feedback.
///
/// No read-modify-write cycles occur on the hot path; the engine only
/// appends, and it appends nothing for cancelled requests.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn append_run(&self, record: RunRecord) -> StorageResult<()>;

    async fn append_feedback(&self, feedback: Feedback) -> StorageResult<()>;
}
