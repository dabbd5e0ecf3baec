//! Stage request/response recording.
//!
//! # Layout
//! ```text
//! <stage base>/request        latest request snapshot (overwritten on re-run)
//! <stage base>/response       latest response snapshot
//! <stage base>/meta           {recorded_at}
//! blockchain/<action>/<ts>_<name>   timestamped audit snapshots
//! blockchain/logs             list of {ts, action, ok, details}, newest last,
//!                             capped at MAX_LOG_ENTRIES
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::artifacts::key::ArtifactKey;
use crate::artifacts::keys;
use crate::artifacts::store::{update_json, ArtifactStore, StoreResult};

/// Oldest entries of `blockchain/logs` are dropped beyond this length.
pub const MAX_LOG_ENTRIES: usize = 1000;

/// Locations written by [`StageRecorder::write_latest_pair`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPair {
    pub request: String,
    pub response: String,
}

/// The latest request/response pair of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub key: String,
    pub request: Option<Value>,
    pub response: Value,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PipelineArtifact {
    /// Load the pair stored under `base`. `None` when no response exists.
    pub fn load_latest<S: ArtifactStore + ?Sized>(
        store: &S,
        base: &ArtifactKey,
    ) -> StoreResult<Option<Self>> {
        let Some(response) = store.read_json(&keys::response(base)?)? else {
            return Ok(None);
        };
        let request = store.read_json(&keys::request(base)?)?;
        let timestamp = store
            .read_json(&base.join("meta")?)
            .ok()
            .flatten()
            .and_then(|m| m.get("recorded_at").and_then(Value::as_str).map(str::to_string))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Ok(Some(Self {
            key: base.to_string(),
            request,
            response,
            timestamp,
        }))
    }
}

/// Writes stage snapshots unless recording is disabled (`no_store`).
pub struct StageRecorder<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
    enabled: bool,
}

impl<'a, S: ArtifactStore + ?Sized> StageRecorder<'a, S> {
    pub fn new(store: &'a S, no_store: bool) -> Self {
        Self {
            store,
            enabled: !no_store,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Overwrite the latest request/response pair under `base`.
    pub fn write_latest_pair(
        &self,
        base: &ArtifactKey,
        request: &Value,
        response: &Value,
    ) -> StoreResult<Option<SavedPair>> {
        if !self.enabled {
            return Ok(None);
        }
        let request_loc = self.store.write_json(&keys::request(base)?, request)?;
        let response_loc = self.store.write_json(&keys::response(base)?, response)?;
        self.store
            .write_json(&base.join("meta")?, &json!({ "recorded_at": Utc::now().to_rfc3339() }))?;
        tracing::debug!(key = %base, "Recorded stage artifacts");
        Ok(Some(SavedPair {
            request: request_loc,
            response: response_loc,
        }))
    }

    /// Write an audit snapshot at `blockchain/<action>/<YYYYmmddTHHMMSSZ>_<name>`.
    /// A second snapshot of the same name within one second gets a `_2`, `_3`,
    /// ... suffix instead of replacing the first.
    pub fn snapshot(&self, action: &str, name: &str, payload: &Value) -> StoreResult<Option<String>> {
        if !self.enabled {
            return Ok(None);
        }
        let name = match name.trim() {
            "" => "run",
            n => n,
        };
        let dir = keys::action_dir(action)?;
        let stem = format!("{}_{}", utc_ts(), name);
        let mut key = dir.join(&stem)?;
        let mut n = 1u32;
        while self.store.exists(&key)? {
            n += 1;
            key = dir.join(&format!("{}_{}", stem, n))?;
        }
        self.store.write_json(&key, payload).map(Some)
    }

    /// Append `{ts, action, ok, details}` to `blockchain/logs`.
    pub fn append_log(&self, action: &str, ok: bool, details: Value) -> StoreResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let entry = json!({
            "ts": Utc::now().to_rfc3339(),
            "action": action,
            "ok": ok,
            "details": details,
        });
        update_json(self.store, &ArtifactKey::new(keys::LOGS)?, |current| {
            let mut logs = current
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            logs.push(entry.clone());
            let excess = logs.len().saturating_sub(MAX_LOG_ENTRIES);
            logs.drain(..excess);
            Value::Array(logs)
        })?;
        Ok(())
    }
}

fn utc_ts() -> String {
    Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}
