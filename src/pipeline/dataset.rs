//! Dataset workflow: prepare the quality report, then register the dataset
//! with an uploader signature over the registry's tuple.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::U256;
use serde_json::{json, Value};

use super::fields::{find_first_str, load_stage, prepared_value};
use super::suite::SUITE_HASH_KEYS;
use super::{require_id, ContractTarget, Pipeline, StageOutput};
use crate::artifacts::{keys, keys::stage, ArtifactStore, RelationSets};
use crate::blockchain::{
    call_view, extract_indexed_topic, BlockchainError, ContractCall, EventField, FeeOverrides, LedgerNode,
};
use crate::error::PipelineError;
use crate::observability::metrics;
use crate::signing::{build_message_hash, normalize_signature, register_dataset_fields, wrap_for_personal_sign};
use crate::tasks::{JobKind, JobService};

pub(crate) const REPORT_URI_KEYS: &[&str] = &["report_uri", "reportURI", "ipfs_uri", "uri"];
const DEFAULT_FILE_FORMAT: &str = "csv";

#[derive(Debug, Clone)]
pub struct PrepareReportArgs {
    pub network: Option<String>,
    pub suite_id: String,
    pub catalog_id: String,
    pub include_report: bool,
}

#[derive(Debug, Clone)]
pub struct RegisterDatasetArgs {
    pub network: Option<String>,
    pub suite_id: String,
    pub catalog_id: String,
    /// Location of the dataset file, e.g. a project path or an `ipfs://` URI.
    pub dataset_uri: String,
    /// Externally produced uploader signature; the local wallet signs otherwise.
    pub signature: Option<String>,
    pub contract: ContractTarget,
    pub fees: FeeOverrides,
}

impl RegisterDatasetArgs {
    pub fn new(suite_id: impl Into<String>, catalog_id: impl Into<String>, dataset_uri: impl Into<String>) -> Self {
        Self {
            network: None,
            suite_id: suite_id.into(),
            catalog_id: catalog_id.into(),
            dataset_uri: dataset_uri.into(),
            signature: None,
            contract: ContractTarget::default(),
            fees: FeeOverrides::default(),
        }
    }
}

impl<J: JobService, L: LedgerNode, S: ArtifactStore> Pipeline<J, L, S> {
    /// Submit the prepare-report job for one dataset of a suite.
    pub async fn prepare_report(&self, args: PrepareReportArgs) -> Result<StageOutput, PipelineError> {
        let network = self.network(args.network.as_deref());
        let suite_id = require_id(&args.suite_id, "suite_id")?;
        let catalog_id = require_id(&args.catalog_id, "catalog_id")?;
        let payload = json!({
            "network": network,
            "suite_id": suite_id,
            "catalog_id": catalog_id,
            "include_report": args.include_report,
        });

        let mut out = self
            .run_task(stage::PREPARE_REPORT, stage::PREPARE_REPORT, JobKind::PrepareReport, &payload)
            .await?;
        let report_uri = out.get("value").and_then(|v| find_first_str(v, REPORT_URI_KEYS));
        if self.options.poll && out.is_ok() && report_uri.is_none() {
            out.warn("prepare report job returned no report URI");
        }
        out.insert("report_uri", report_uri);

        let base = keys::dataset_stage(suite_id, catalog_id, stage::PREPARE_REPORT)?;
        self.persist(&base, &payload, &mut out, "saved")?;
        metrics::record_stage(stage::PREPARE_REPORT, out.is_ok());
        Ok(out)
    }

    /// Register a dataset under a prepared suite and report.
    ///
    /// The suite hash and report URI are read from the persisted prepare
    /// responses, the file format from the suite record, and the nonce live
    /// from `nonces(sender)` right before signing.
    pub async fn register_dataset(&self, args: RegisterDatasetArgs) -> Result<StageOutput, PipelineError> {
        let network = self.network(args.network.as_deref());
        let suite_id = require_id(&args.suite_id, "suite_id")?;
        let catalog_id = require_id(&args.catalog_id, "catalog_id")?;
        let dataset_uri = require_id(&args.dataset_uri, "dataset_uri")?;

        let suite_base = keys::suite_stage(suite_id, stage::PREPARE_SUITE)?;
        let suite_key = keys::response(&suite_base)?;
        let suite_prepared = prepared_value(&load_stage(&self.store, &suite_base)?.response, &suite_key)?;
        let suite_hash = find_first_str(&Value::Object(suite_prepared), SUITE_HASH_KEYS)
            .filter(|h| h.starts_with("0x"))
            .ok_or_else(|| PipelineError::missing(&suite_key, "no 0x-prefixed suite hash"))?;

        let report_base = keys::dataset_stage(suite_id, catalog_id, stage::PREPARE_REPORT)?;
        let report_key = keys::response(&report_base)?;
        let report_prepared = prepared_value(&load_stage(&self.store, &report_base)?.response, &report_key)?;
        let report_uri = find_first_str(&Value::Object(report_prepared), REPORT_URI_KEYS)
            .filter(|uri| uri.starts_with("ipfs://"))
            .ok_or_else(|| PipelineError::missing(&report_key, "no ipfs:// report URI"))?;

        let file_format = self.suite_file_format(suite_id)?;

        let contract = self.contract(&network, &self.config.contracts.dataset_registry, &args.contract)?;
        let wallet = self.wallet()?;
        let sender = wallet.address();

        let nonces = ContractCall::new(&contract, "nonces", vec![DynSolValue::Address(sender)])?;
        let nonce: U256 = call_view(&self.node, &nonces, sender)
            .await?
            .first()
            .and_then(DynSolValue::as_uint)
            .map(|(n, _)| n)
            .ok_or_else(|| BlockchainError::Abi("nonces(sender) did not return an integer".to_string()))?;

        let fields = register_dataset_fields(dataset_uri, &suite_hash, &file_format, &report_uri, sender, nonce)?;
        let inner_hash = build_message_hash(&fields);
        let message_hash = wrap_for_personal_sign(inner_hash);
        let signature = match args.signature.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(external) => normalize_signature(external)?,
            None => wallet.sign_personal(inner_hash).await?,
        };
        tracing::debug!(nonce = %nonce, message_hash = %message_hash, "Dataset registration signed");

        let request_meta = json!({
            "network": network,
            "suite_id": suite_id,
            "catalog_id": catalog_id,
            "registry_name": contract.name,
            "registry_address": contract.address,
            "sender": sender,
            "call_args": {
                "uri": dataset_uri,
                "suiteHash": suite_hash,
                "fileFormat": file_format,
                "reportUri": report_uri,
                "nonce": nonce.to_string(),
                "signature": signature.to_hex(),
                "inner_hash_hex": inner_hash,
                "message_hash_hex": message_hash,
            },
            "suite_prepare_key": suite_key.as_str(),
            "report_prepare_key": report_key.as_str(),
        });

        let call = ContractCall::from_json(
            &contract,
            "registerDataset",
            &[
                json!(dataset_uri),
                json!(suite_hash),
                json!(file_format),
                json!(report_uri),
                json!(nonce.to_string()),
                json!(signature.to_hex()),
            ],
        )?;

        let base = keys::dataset_stage(suite_id, catalog_id, stage::REGISTER_DATASET)?;
        let result = async {
            let tx = self.transact(&call, &args.fees, None).await?;
            let fingerprint = extract_indexed_topic(
                &tx.receipt.logs,
                EventField {
                    abi: Some(&contract.abi),
                    event: &self.config.contracts.dataset_registered_event,
                    field: &self.config.contracts.fingerprint_field,
                    emitter: Some(contract.address),
                },
            );
            match &fingerprint {
                Some(found) => tracing::info!(fingerprint = %found.value, strategy = ?found.strategy, "Dataset registered"),
                None => tracing::warn!(tx_hash = %tx.tx_hash, "No dataset fingerprint found in receipt logs"),
            }
            let ingest = self
                .ingest(&network, &contract.address.to_string(), &tx.tx_hash.to_string(), self.options.poll)
                .await;
            let mut out = StageOutput::success(stage::REGISTER_DATASET)
                .with("network", &network)
                .with("registry_address", contract.address)
                .with("suite_id", suite_id)
                .with("catalog_id", catalog_id)
                .with("sender", sender)
                .with("gas_estimate", tx.gas_estimate)
                .with("tx_hash", tx.tx_hash)
                .with("receipt", &tx.receipt.raw)
                .with("fingerprint", fingerprint.map(|f| f.value))
                .with("fingerprint_strategy", fingerprint.map(|f| f.strategy))
                .with("request_meta", &request_meta)
                .with("ingest", ingest);
            if !self.options.no_store {
                if let Err(e) = RelationSets::new(&self.store).link(suite_id, catalog_id) {
                    tracing::warn!(suite_id, catalog_id, error = %e, "Failed to link suite and dataset");
                    out.warn(format!("suite/dataset link not updated: {}", e));
                }
            }
            Ok::<_, PipelineError>(out)
        }
        .await;

        self.conclude(stage::REGISTER_DATASET, &base, &request_meta, result, json!({}))
    }

    /// First declared file type of the suite, lower-cased; `csv` when none.
    fn suite_file_format(&self, suite_id: &str) -> Result<String, PipelineError> {
        let key = keys::suite_record(suite_id)?;
        let record = self
            .store
            .read_json(&key)?
            .ok_or_else(|| PipelineError::missing(&key, "suite record not found"))?;
        let suite = match record.get("suite") {
            Some(inner @ Value::Object(_)) => inner,
            _ => &record,
        };
        if !suite.is_object() {
            return Err(PipelineError::missing(&key, "suite record is not an object"));
        }
        let format = ["file_types", "fileTypes"]
            .iter()
            .filter_map(|k| suite.get(*k).and_then(Value::as_array))
            .flat_map(|types| types.iter().filter_map(Value::as_str))
            .map(|t| t.trim().to_ascii_lowercase())
            .find(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_FORMAT.to_string());
        Ok(format)
    }
}
