//! Reading fields back out of persisted artifacts.
//!
//! A persisted prepare response is either a stage output carrying the job's
//! tagged [`TaskOutcome`] under `outcome`, or a bare object holding the
//! fields directly (hand-authored artifacts). Anything else is a
//! `MissingArtifact`.

use serde_json::{Map, Value};

use crate::artifacts::{keys, ArtifactKey, ArtifactStore, PipelineArtifact, StoreError};
use crate::error::PipelineError;
use crate::tasks::TaskOutcome;

/// Load the latest pair under `base`, failing with `MissingArtifact` naming
/// the response key when it is absent or undecodable.
pub fn load_stage<S: ArtifactStore + ?Sized>(
    store: &S,
    base: &ArtifactKey,
) -> Result<PipelineArtifact, PipelineError> {
    let response_key = keys::response(base)?;
    match PipelineArtifact::load_latest(store, base) {
        Ok(Some(artifact)) => Ok(artifact),
        Ok(None) => Err(PipelineError::missing(&response_key, "not found")),
        Err(StoreError::Malformed { reason, .. }) => Err(PipelineError::missing(&response_key, reason)),
        Err(e) => Err(e.into()),
    }
}

/// The job value of a persisted prepare response, as an object.
pub fn prepared_value(response: &Value, key: &ArtifactKey) -> Result<Map<String, Value>, PipelineError> {
    let value = match response.get("outcome") {
        Some(outcome @ Value::Object(_)) => {
            let outcome: TaskOutcome = serde_json::from_value(outcome.clone())
                .map_err(|e| PipelineError::missing(key, format!("unreadable outcome: {}", e)))?;
            match outcome {
                TaskOutcome::Succeeded { value } => value,
                TaskOutcome::Failed { message } => {
                    return Err(PipelineError::missing(key, format!("prepare job failed: {}", message)))
                }
                TaskOutcome::Pending { state } => {
                    return Err(PipelineError::missing(
                        key,
                        format!("prepare job not finished (state {}); re-run with polling", state),
                    ))
                }
            }
        }
        _ => response.clone(),
    };
    match value {
        Value::Object(obj) => Ok(obj),
        other => Err(PipelineError::missing(
            key,
            format!("expected a JSON object, found {}", type_name(&other)),
        )),
    }
}

/// First non-empty string among `keys`, trimmed.
pub fn get_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// First non-negative integer among `keys`; digit strings are accepted.
pub fn get_int(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
                .then(|| s.parse().ok())
                .flatten()
        }
        _ => None,
    })
}

/// Lenient boolean: `true`/`1`/`yes`/`y` and their negatives.
pub fn get_bool(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Some(true),
            "false" | "0" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Breadth-first search for the first non-empty string under any of `keys`.
pub fn find_first_str(value: &Value, keys: &[&str]) -> Option<String> {
    let mut queue = std::collections::VecDeque::from([value]);
    while let Some(current) = queue.pop_front() {
        match current {
            Value::Object(obj) => {
                if let Some(found) = get_str(obj, keys) {
                    return Some(found);
                }
                queue.extend(obj.values());
            }
            Value::Array(items) => queue.extend(items.iter()),
            _ => {}
        }
    }
    None
}

/// Require a non-empty string field, naming the artifact on failure.
pub fn require_str(obj: &Map<String, Value>, field: &str, key: &ArtifactKey) -> Result<String, PipelineError> {
    get_str(obj, &[field]).ok_or_else(|| PipelineError::missing(key, format!("missing '{}'", field)))
}

/// Collects required fields from one artifact, reporting every missing one
/// at once.
pub struct RequiredFields<'a> {
    obj: &'a Map<String, Value>,
    missing: Vec<&'static str>,
}

impl<'a> RequiredFields<'a> {
    pub fn new(obj: &'a Map<String, Value>) -> Self {
        Self {
            obj,
            missing: Vec::new(),
        }
    }

    /// `name` or the first present alias; empty when missing.
    pub fn str(&mut self, name: &'static str, aliases: &[&str]) -> String {
        let found = get_str(self.obj, &[name]).or_else(|| get_str(self.obj, aliases));
        found.unwrap_or_else(|| {
            self.missing.push(name);
            String::new()
        })
    }

    pub fn int(&mut self, name: &'static str, aliases: &[&str]) -> u64 {
        let found = get_int(self.obj, &[name]).or_else(|| get_int(self.obj, aliases));
        found.unwrap_or_else(|| {
            self.missing.push(name);
            0
        })
    }

    pub fn finish(self, key: &ArtifactKey) -> Result<(), PipelineError> {
        if self.missing.is_empty() {
            return Ok(());
        }
        Err(PipelineError::missing(
            key,
            format!("missing fields: {}", self.missing.join(", ")),
        ))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
