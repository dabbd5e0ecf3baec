//! Suite ↔ dataset link sets.
//!
//! Both directions are stored as sorted, de-duplicated JSON string arrays and
//! updated through [`update_json`], so two writers sharing a store root never
//! drop each other's links.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::artifacts::keys;
use crate::artifacts::store::{update_json, ArtifactStore, StoreResult};
use crate::artifacts::ArtifactKey;

pub struct RelationSets<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ArtifactStore + ?Sized> RelationSets<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Record that `dataset_id` belongs to `suite_id`, in both directions.
    pub fn link(&self, suite_id: &str, dataset_id: &str) -> StoreResult<()> {
        let suite_id = suite_id.trim();
        let dataset_id = dataset_id.trim();
        self.add(&keys::suite_datasets(suite_id)?, dataset_id)?;
        self.add(&keys::dataset_suites(dataset_id)?, suite_id)?;
        tracing::debug!(suite_id, dataset_id, "Linked suite and dataset");
        Ok(())
    }

    pub fn datasets_for_suite(&self, suite_id: &str) -> StoreResult<Vec<String>> {
        self.read(&keys::suite_datasets(suite_id.trim())?)
    }

    pub fn suites_for_dataset(&self, dataset_id: &str) -> StoreResult<Vec<String>> {
        self.read(&keys::dataset_suites(dataset_id.trim())?)
    }

    fn add(&self, key: &ArtifactKey, member: &str) -> StoreResult<()> {
        update_json(self.store, key, |current| {
            let mut set = to_set(current);
            set.insert(member.to_string());
            Value::from(set.into_iter().collect::<Vec<_>>())
        })?;
        Ok(())
    }

    /// Missing or malformed sets read as empty.
    fn read(&self, key: &ArtifactKey) -> StoreResult<Vec<String>> {
        match self.store.read_json(key) {
            Ok(v) => Ok(to_set(v.as_ref()).into_iter().collect()),
            Err(crate::artifacts::StoreError::Malformed { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn to_set(value: Option<&Value>) -> BTreeSet<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
