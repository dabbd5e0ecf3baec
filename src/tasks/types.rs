//! Remote job data model.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference returned when a job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    #[serde(alias = "id")]
    pub task_id: String,
}

impl TaskHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

/// Job state as reported by the service. Only `Success` and `Failure` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Other(String),
}

impl TaskState {
    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Retry => "RETRY",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl From<String> for TaskState {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TaskState::Pending,
            "STARTED" => TaskState::Started,
            "RETRY" => TaskState::Retry,
            "SUCCESS" => TaskState::Success,
            "FAILURE" => TaskState::Failure,
            _ => TaskState::Other(s),
        }
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET /tasks/status/<id>`.
///
/// The service may embed the job's result directly here, which is the
/// fallback when the result endpoint is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            result: None,
            error: None,
            extra: Map::new(),
        }
    }

    /// A `FAILURE` status standing in for a transport error seen while polling.
    pub fn synthetic_failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(TaskState::Failure)
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Success
    }

    pub fn is_failure(&self) -> bool {
        self.state == TaskState::Failure
    }

    /// Best failure description available.
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

/// Body of `GET /tasks/result/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultPayload {
    pub ready: bool,
    #[serde(default)]
    pub successful: Option<bool>,
    #[serde(default, alias = "result")]
    pub value: Value,
}

/// The one resolved shape of a job, consumed by every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded { value: Value },
    Failed { message: String },
    Pending { state: TaskState },
}

impl TaskOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            TaskOutcome::Succeeded { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

/// Outcome of polling several jobs together.
///
/// `pending ∪ succeeded ∪ failed` always equals the input id set, and
/// `timed_out` is true exactly when `pending` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WaitManyResult {
    pub statuses: BTreeMap<String, TaskStatus>,
    pub pending: BTreeSet<String>,
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeSet<String>,
    pub timed_out: bool,
}
