//! Well-known artifact keys.
//!
//! Every stage reads its predecessor from one of these locations, so the
//! layout is part of the resumability contract.

use crate::artifacts::key::ArtifactKey;
use crate::artifacts::store::StoreResult;

pub const BLOCKCHAIN_ROOT: &str = "blockchain";
pub const LOGS: &str = "blockchain/logs";

/// Stage names used as the last directory of a stage base key.
pub mod stage {
    pub const PREPARE_SUITE: &str = "prepare_suite_artifacts";
    pub const REGISTER_SUITE: &str = "register_suite";
    pub const PREPARE_REPORT: &str = "prepare_report";
    pub const REGISTER_DATASET: &str = "register_dataset";
    pub const PREPARE_REWARD: &str = "prepare_reward";
    pub const CLAIM_REWARD: &str = "claim_reward_and_mint";
    pub const PREPARE_VALIDATION: &str = "prepare_validation";
    pub const REGISTER_VALIDATION: &str = "register_validation";
}

pub fn contract_index(network: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("blockchain/contracts/{}/_index", network))
}

pub fn contract_abi(network: &str, address: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("blockchain/contracts/{}/{}.abi", network, address))
}

/// Per-contract summary written by a registry refresh.
pub fn contract_summary(network: &str, address: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("blockchain/contracts/{}/{}", network, address))
}

pub fn suite_record(suite_id: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("expectations/suites/{}/suite", suite_id))
}

pub fn suite_datasets(suite_id: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("expectations/suites/{}/datasets", suite_id))
}

pub fn dataset_suites(dataset_id: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("expectations/datasets/{}/suites", dataset_id))
}

/// `blockchain/expectations/suites/<suite>/<stage>`
pub fn suite_stage(suite_id: &str, stage: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("blockchain/expectations/suites/{}/{}", suite_id, stage))
}

/// `blockchain/expectations/suites/<suite>/datasets/<catalog>/<stage>`
pub fn dataset_stage(suite_id: &str, catalog_id: &str, stage: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!(
        "blockchain/expectations/suites/{}/datasets/{}/{}",
        suite_id, catalog_id, stage
    ))
}

/// `blockchain/validations/<fingerprint>/<stage>`
pub fn validation_stage(fingerprint: &str, stage: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(&format!("blockchain/validations/{}/{}", fingerprint, stage))
}

/// Audit directory for an action: `blockchain/<action>`.
pub fn action_dir(action: &str) -> StoreResult<ArtifactKey> {
    ArtifactKey::new(BLOCKCHAIN_ROOT)?.join(action)
}

pub fn request(base: &ArtifactKey) -> StoreResult<ArtifactKey> {
    base.join("request")
}

pub fn response(base: &ArtifactKey) -> StoreResult<ArtifactKey> {
    base.join("response")
}
