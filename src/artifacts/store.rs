//! The artifact store contract shared by every backend.

use serde_json::Value;
use thiserror::Error;

use crate::artifacts::key::ArtifactKey;

/// Errors raised by artifact store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),

    #[error("IO error at '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not encode JSON for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed JSON at '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("Lock on '{0}' is held by another writer")]
    LockContended(String),

    #[error("Concurrent updates to '{key}' did not settle after {attempts} attempts")]
    UpdateConflict { key: String, attempts: u32 },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Hierarchical key → JSON document / byte blob persistence.
///
/// Writes to an existing key overwrite it. `read_json` distinguishes an absent
/// key (`Ok(None)`) from one whose content does not decode (`Err(Malformed)`).
pub trait ArtifactStore: Send + Sync {
    /// Write a JSON document, returning a human-readable location.
    fn write_json(&self, key: &ArtifactKey, value: &Value) -> StoreResult<String>;

    fn read_json(&self, key: &ArtifactKey) -> StoreResult<Option<Value>>;

    /// Write a raw blob stored alongside JSON keys with its own extension.
    fn write_bytes(&self, key: &ArtifactKey, data: &[u8], ext: &str) -> StoreResult<String>;

    fn read_bytes(&self, key: &ArtifactKey, ext: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Delete a JSON key. Returns whether something was removed.
    fn delete(&self, key: &ArtifactKey) -> StoreResult<bool>;

    /// Atomically replace the document at `key` with `new` if its current
    /// content equals `expected` (`None` = key absent). Returns whether the
    /// swap happened.
    fn compare_and_swap(
        &self,
        key: &ArtifactKey,
        expected: Option<&Value>,
        new: &Value,
    ) -> StoreResult<bool>;

    fn exists(&self, key: &ArtifactKey) -> StoreResult<bool> {
        Ok(self.read_json(key)?.is_some())
    }
}

/// Maximum read-modify-write rounds before giving up.
pub const MAX_UPDATE_ATTEMPTS: u32 = 32;

/// Read-modify-write a key through `compare_and_swap`, retrying on interference.
///
/// A malformed current document is handed to `f` as `None`, the same as an
/// absent one, so a corrupted link file heals on the next write.
pub fn update_json<S, F>(store: &S, key: &ArtifactKey, mut f: F) -> StoreResult<Value>
where
    S: ArtifactStore + ?Sized,
    F: FnMut(Option<&Value>) -> Value,
{
    for _ in 0..MAX_UPDATE_ATTEMPTS {
        let current = match store.read_json(key) {
            Ok(v) => v,
            Err(StoreError::Malformed { .. }) => {
                tracing::warn!(key = %key, "Replacing malformed document");
                store.delete(key)?;
                None
            }
            Err(e) => return Err(e),
        };
        let next = f(current.as_ref());
        if store.compare_and_swap(key, current.as_ref(), &next)? {
            return Ok(next);
        }
        tracing::debug!(key = %key, "Concurrent update detected, retrying");
    }
    Err(StoreError::UpdateConflict {
        key: key.to_string(),
        attempts: MAX_UPDATE_ATTEMPTS,
    })
}
