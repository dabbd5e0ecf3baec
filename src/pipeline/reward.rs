//! Reward workflow: obtain the backend's claim attestation for a registered
//! dataset, then claim the reward and mint in one transaction.

use serde_json::{json, Map, Value};

use super::fields::{get_int, get_str, load_stage, prepared_value, RequiredFields};
use super::{require_id, ContractTarget, Pipeline, StageOutput};
use crate::artifacts::{keys, keys::stage, ArtifactStore};
use crate::blockchain::{
    extract_identifier, ContractCall, EventField, FeeOverrides, LedgerNode, ReceiptView, ResolvedContract,
};
use crate::error::PipelineError;
use crate::observability::metrics;
use crate::signing::normalize_signature;
use crate::tasks::{JobKind, JobService};

#[derive(Debug, Clone)]
pub struct PrepareRewardArgs {
    pub network: Option<String>,
    pub suite_id: String,
    pub catalog_id: String,
    pub project_id: String,
    pub category: String,
    pub expires_in_sec: u64,
}

impl PrepareRewardArgs {
    pub fn new(suite_id: impl Into<String>, catalog_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            network: None,
            suite_id: suite_id.into(),
            catalog_id: catalog_id.into(),
            project_id: project_id.into(),
            category: "dataset".to_string(),
            expires_in_sec: 900,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaimRewardArgs {
    pub network: Option<String>,
    pub suite_id: String,
    pub catalog_id: String,
    /// Dataset request id; read from the suite registration receipt when absent.
    pub request_id: Option<u64>,
    pub contract: ContractTarget,
    pub fees: FeeOverrides,
}

impl ClaimRewardArgs {
    pub fn new(suite_id: impl Into<String>, catalog_id: impl Into<String>) -> Self {
        Self {
            network: None,
            suite_id: suite_id.into(),
            catalog_id: catalog_id.into(),
            request_id: None,
            contract: ContractTarget::default(),
            fees: FeeOverrides::default(),
        }
    }
}

impl<J: JobService, L: LedgerNode, S: ArtifactStore> Pipeline<J, L, S> {
    /// Submit the prepare-reward job for a registered dataset. The uploader
    /// is the local wallet.
    pub async fn prepare_reward(&self, args: PrepareRewardArgs) -> Result<StageOutput, PipelineError> {
        let network = self.network(args.network.as_deref());
        let suite_id = require_id(&args.suite_id, "suite_id")?;
        let catalog_id = require_id(&args.catalog_id, "catalog_id")?;
        let project_id = require_id(&args.project_id, "project_id")?;
        let uploader = self.wallet()?.address();

        let registered_base = keys::dataset_stage(suite_id, catalog_id, stage::REGISTER_DATASET)?;
        let registered_key = keys::response(&registered_base)?;
        let registered = load_stage(&self.store, &registered_base)?;
        let fingerprint = registered_fingerprint(&registered.response)
            .ok_or_else(|| PipelineError::missing(&registered_key, "no dataset fingerprint"))?;

        let payload = json!({
            "network": network,
            "category": args.category.trim(),
            "dataset_fingerprint": fingerprint,
            "uploader": uploader,
            "expires_in_sec": args.expires_in_sec,
            "suite_id": suite_id,
            "catalog_id": catalog_id,
            "project_id": project_id,
        });

        let mut out = self
            .run_task(stage::PREPARE_REWARD, stage::PREPARE_REWARD, JobKind::PrepareReward, &payload)
            .await?;
        out.insert("dataset_fingerprint", &fingerprint);

        let base = keys::dataset_stage(suite_id, catalog_id, stage::PREPARE_REWARD)?;
        self.persist(&base, &payload, &mut out, "saved")?;
        metrics::record_stage(stage::PREPARE_REWARD, out.is_ok());
        Ok(out)
    }

    /// Claim the reward with the prepared attestation.
    pub async fn claim_reward(&self, args: ClaimRewardArgs) -> Result<StageOutput, PipelineError> {
        let network = self.network(args.network.as_deref());
        let suite_id = require_id(&args.suite_id, "suite_id")?;
        let catalog_id = require_id(&args.catalog_id, "catalog_id")?;

        let prepared_base = keys::dataset_stage(suite_id, catalog_id, stage::PREPARE_REWARD)?;
        let prepared_key = keys::response(&prepared_base)?;
        let mut reward = prepared_value(&load_stage(&self.store, &prepared_base)?.response, &prepared_key)?;
        if let Some(Value::Object(inner)) = reward.remove("value") {
            reward = inner;
        }

        let mut required = RequiredFields::new(&reward);
        let fingerprint = required.str("datasetFingerprint", &[]);
        let category = required.str("category", &[]);
        let level = required.str("level", &[]);
        let metadata_uri = required.str("metadataURI", &[]);
        let deadline = required.int("deadline", &[]);
        let signature = required.str("signature", &[]);
        required.finish(&prepared_key)?;
        let signature = normalize_signature(&signature)?;

        let contract = self.contract(&network, &self.config.contracts.request_registry, &args.contract)?;
        let request_id = match args.request_id {
            Some(id) => id,
            None => self.registered_request_id(suite_id, &contract)?,
        };
        let sender = self.wallet()?.address();

        let call = ContractCall::from_json(
            &contract,
            "claimRewardForDatasetAndMint",
            &[
                json!(request_id),
                json!(fingerprint),
                json!(category),
                json!(level),
                json!(metadata_uri),
                json!(deadline),
                json!(signature.to_hex()),
            ],
        )?;

        let request_meta = json!({
            "network": network,
            "suite_id": suite_id,
            "catalog_id": catalog_id,
            "request_contract_address": contract.address,
            "request_id": request_id,
            "sender": sender,
            "call_args": {
                "id": request_id,
                "datasetFingerprint": fingerprint,
                "nftCategory": category,
                "level": level,
                "metadataURI": metadata_uri,
                "deadline": deadline,
                "claimSignature": signature.to_hex(),
            },
            "prepare_reward_key": prepared_key.as_str(),
        });

        let result = async {
            let tx = self.transact(&call, &args.fees, Some(deadline)).await?;
            let ingest = self
                .ingest(&network, &contract.address.to_string(), &tx.tx_hash.to_string(), self.options.poll)
                .await;
            Ok::<_, PipelineError>(
                StageOutput::success(stage::CLAIM_REWARD)
                    .with("network", &network)
                    .with("request_contract_address", contract.address)
                    .with("request_id", request_id)
                    .with("suite_id", suite_id)
                    .with("catalog_id", catalog_id)
                    .with("sender", sender)
                    .with("gas_estimate", tx.gas_estimate)
                    .with("tx_hash", tx.tx_hash)
                    .with("receipt", &tx.receipt.raw)
                    .with("request_meta", &request_meta)
                    .with("ingest", ingest),
            )
        }
        .await;

        let base = keys::dataset_stage(suite_id, catalog_id, stage::CLAIM_REWARD)?;
        self.conclude(stage::CLAIM_REWARD, &base, &request_meta, result, json!({}))
    }

    /// Request id of the suite's registration: the recorded extraction first,
    /// then the persisted receipt.
    fn registered_request_id(&self, suite_id: &str, contract: &ResolvedContract) -> Result<u64, PipelineError> {
        let base = keys::suite_stage(suite_id, stage::REGISTER_SUITE)?;
        let key = keys::response(&base)?;
        let response = load_stage(&self.store, &base)?.response;

        let recorded = response.get("request_id").and_then(|r| match r {
            Value::Object(obj) => get_int(obj, &["value"]),
            other => other.as_u64(),
        });
        if let Some(id) = recorded {
            return Ok(id);
        }

        let receipt = response
            .get("receipt")
            .cloned()
            .map(ReceiptView::from_json)
            .transpose()
            .map_err(|e| PipelineError::missing(&key, format!("unreadable receipt: {}", e)))?
            .ok_or_else(|| PipelineError::missing(&key, "no receipt; pass the request id explicitly"))?;
        extract_identifier(
            &receipt.logs,
            EventField {
                abi: Some(&contract.abi),
                event: &self.config.contracts.request_created_event,
                field: &self.config.contracts.request_id_field,
                emitter: None,
            },
        )
        .map(|found| found.value)
        .ok_or_else(|| PipelineError::missing(&key, "no request id in receipt; pass it explicitly"))
    }
}

/// Fingerprint recorded by dataset registration: the extracted value, then
/// the call arguments, then the fourth topic of the first receipt log.
fn registered_fingerprint(response: &Value) -> Option<String> {
    let empty = Map::new();
    let top = response.as_object().unwrap_or(&empty);
    let from_call_args = || {
        response
            .pointer("/request_meta/call_args")
            .and_then(Value::as_object)
            .and_then(|args| get_str(args, &["datasetFingerprint", "dataset_fingerprint", "fingerprint"]))
    };
    let from_receipt = || {
        response
            .pointer("/receipt/logs/0/topics/3")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };
    get_str(top, &["fingerprint"])
        .or_else(from_call_args)
        .or_else(from_receipt)
        .map(|fp| if fp.starts_with("0x") { fp } else { format!("0x{}", fp) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_sources_in_order() {
        let fp = format!("0x{}", "ab".repeat(32));
        assert_eq!(registered_fingerprint(&json!({"fingerprint": fp})), Some(fp.clone()));

        let via_args = json!({
            "fingerprint": null,
            "request_meta": {"call_args": {"datasetFingerprint": "cd"}},
        });
        assert_eq!(registered_fingerprint(&via_args), Some("0xcd".into()));

        let via_receipt = json!({
            "receipt": {"logs": [{"topics": ["0x01", "0x02", "0x03", fp]}]},
        });
        assert_eq!(registered_fingerprint(&via_receipt), Some(fp));
        assert_eq!(registered_fingerprint(&json!({"ok": false})), None);
    }
}
