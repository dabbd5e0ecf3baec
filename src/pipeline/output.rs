//! The JSON object every stage emits.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// `error` member of a failed stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// `{ok, stage, ...data, error?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    stage: String,
    ok: bool,
    data: Map<String, Value>,
    error: Option<StageFailure>,
}

impl StageOutput {
    pub fn success(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ok: true,
            data: Map::new(),
            error: None,
        }
    }

    /// A failed stage. `details` members are merged over the error's own
    /// `stage` detail.
    pub fn failure(stage: &str, error: &PipelineError, details: Option<Value>) -> Self {
        let mut merged = Map::new();
        if let Some(failed_at) = error.stage() {
            merged.insert("stage".to_string(), Value::String(failed_at.to_string()));
        }
        if let Some(Value::Object(extra)) = details {
            merged.extend(extra);
        }
        Self {
            stage: stage.to_string(),
            ok: false,
            data: Map::new(),
            error: Some(StageFailure {
                code: error.code().to_string(),
                message: error.to_string(),
                details: (!merged.is_empty()).then_some(Value::Object(merged)),
                hint: error.hint().map(str::to_string),
            }),
        }
    }

    /// Mark a successful run as failed without an error object, e.g. a job
    /// that finished in `FAILURE` but whose output is still worth keeping.
    pub fn mark_failed(mut self) -> Self {
        self.ok = false;
        self
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.data.insert(key.to_string(), value);
    }

    /// Append to the `warnings` list.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = Value::String(message.into());
        match self.data.get_mut("warnings") {
            Some(Value::Array(items)) => items.push(message),
            _ => {
                self.data.insert("warnings".to_string(), Value::Array(vec![message]));
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn error(&self) -> Option<&StageFailure> {
        self.error.as_ref()
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("ok".to_string(), Value::Bool(self.ok));
        obj.insert("stage".to_string(), Value::String(self.stage.clone()));
        for (k, v) in &self.data {
            obj.insert(k.clone(), v.clone());
        }
        if let Some(error) = &self.error {
            obj.insert(
                "error".to_string(),
                serde_json::to_value(error).unwrap_or(Value::Null),
            );
        }
        Value::Object(obj)
    }
}

impl Serialize for StageOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
