//! The remote job service seam.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tasks::types::{TaskHandle, TaskResultPayload, TaskStatus};

/// Errors talking to the job service.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Job service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Unexpected job service response: {0}")]
    Decode(String),

    #[error("Task {task_id} failed: {message}")]
    Failed { task_id: String, message: String },

    #[error("Operation not supported by this job service: {0}")]
    Unsupported(&'static str),
}

impl TaskError {
    /// Whether repeating the same idempotent request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TaskError::Transport(_) => true,
            TaskError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Kinds of job the pipeline submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    PrepareSuite,
    PrepareReward,
    PrepareValidation,
    PrepareReport,
    IngestTx,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::PrepareSuite => "prepare_suite",
            JobKind::PrepareReward => "prepare_reward",
            JobKind::PrepareValidation => "prepare_validation",
            JobKind::PrepareReport => "prepare_report",
            JobKind::IngestTx => "ingest_tx",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub kind: JobKind,
    pub payload: Value,
}

impl JobRequest {
    pub fn new(kind: JobKind, payload: Value) -> Self {
        Self { kind, payload }
    }
}

/// Asynchronous job service.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submit a job. Never retried.
    async fn submit(&self, request: &JobRequest) -> Result<TaskHandle, TaskError>;

    async fn status(&self, task_id: &str) -> Result<TaskStatus, TaskError>;

    /// May be unavailable on some deployments; callers fall back to the
    /// status-embedded result.
    async fn result(&self, task_id: &str) -> Result<TaskResultPayload, TaskError>;

    /// One page of the deployed-contracts listing (`{data: [...]}`).
    async fn list_contracts(&self, _network: &str, _page: u32, _per_page: u32) -> Result<Value, TaskError> {
        Err(TaskError::Unsupported("list_contracts"))
    }

    /// One deployed contract, with its ABI when `include_abi` is set.
    async fn get_contract(&self, _address: &str, _include_abi: bool) -> Result<Value, TaskError> {
        Err(TaskError::Unsupported("get_contract"))
    }
}

/// Drop `null` object members, recursively. The service treats an explicit
/// `null` differently from an absent field.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_nulls_recurses_into_objects() {
        let v = strip_nulls(json!({"a": null, "b": {"c": null, "d": 1}, "e": [null, {"f": null}]}));
        assert_eq!(v, json!({"b": {"d": 1}, "e": [null, {}]}));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TaskError::Transport("reset".into()).is_retryable());
        assert!(TaskError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(!TaskError::Http { status: 404, body: String::new() }.is_retryable());
        assert!(!TaskError::Decode("x".into()).is_retryable());
    }
}
