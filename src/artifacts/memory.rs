//! In-memory artifact store for tests and dry runs.

use dashmap::DashMap;
use serde_json::Value;

use crate::artifacts::key::ArtifactKey;
use crate::artifacts::store::{ArtifactStore, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    json: DashMap<String, Value>,
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of JSON documents held.
    pub fn len(&self) -> usize {
        self.json.len()
    }

    pub fn is_empty(&self) -> bool {
        self.json.is_empty()
    }

    /// All JSON keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.json.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn blob_key(key: &ArtifactKey, ext: &str) -> String {
        format!("{}.{}", key.as_str(), ext.trim_start_matches('.'))
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write_json(&self, key: &ArtifactKey, value: &Value) -> StoreResult<String> {
        self.json.insert(key.to_string(), value.clone());
        Ok(format!("memory://{}.json", key))
    }

    fn read_json(&self, key: &ArtifactKey) -> StoreResult<Option<Value>> {
        Ok(self.json.get(key.as_str()).map(|v| v.value().clone()))
    }

    fn write_bytes(&self, key: &ArtifactKey, data: &[u8], ext: &str) -> StoreResult<String> {
        let k = Self::blob_key(key, ext);
        self.blobs.insert(k.clone(), data.to_vec());
        Ok(format!("memory://{}", k))
    }

    fn read_bytes(&self, key: &ArtifactKey, ext: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(&Self::blob_key(key, ext)).map(|v| v.value().clone()))
    }

    fn delete(&self, key: &ArtifactKey) -> StoreResult<bool> {
        Ok(self.json.remove(key.as_str()).is_some())
    }

    fn compare_and_swap(
        &self,
        key: &ArtifactKey,
        expected: Option<&Value>,
        new: &Value,
    ) -> StoreResult<bool> {
        use dashmap::mapref::entry::Entry;

        // The entry holds the shard lock for the whole check-then-write.
        match (self.json.entry(key.to_string()), expected) {
            (Entry::Vacant(slot), None) => {
                slot.insert(new.clone());
                Ok(true)
            }
            (Entry::Occupied(mut slot), Some(expected)) if slot.get() == expected => {
                slot.insert(new.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
