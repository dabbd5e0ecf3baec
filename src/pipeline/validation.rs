//! Validation workflow, keyed by dataset fingerprint.

use serde_json::{json, Value};

use super::dataset::REPORT_URI_KEYS;
use super::fields::{find_first_str, get_bool, get_str, load_stage, prepared_value, RequiredFields};
use super::{require_id, ContractTarget, Pipeline, StageOutput};
use crate::artifacts::{keys, keys::stage, ArtifactStore};
use crate::blockchain::{ContractCall, FeeOverrides, LedgerNode};
use crate::error::PipelineError;
use crate::observability::metrics;
use crate::tasks::{JobKind, JobService};

#[derive(Debug, Clone)]
pub struct RegisterValidationArgs {
    pub network: Option<String>,
    pub fingerprint: String,
    pub contract: ContractTarget,
    pub fees: FeeOverrides,
}

impl RegisterValidationArgs {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            network: None,
            fingerprint: fingerprint.into(),
            contract: ContractTarget::default(),
            fees: FeeOverrides::default(),
        }
    }
}

impl<J: JobService, L: LedgerNode, S: ArtifactStore> Pipeline<J, L, S> {
    /// Submit the prepare-validation job. The payload must carry the dataset
    /// fingerprint; `successful` defaults to `true`.
    pub async fn prepare_validation(&self, payload: Value) -> Result<StageOutput, PipelineError> {
        let Value::Object(mut payload) = payload else {
            return Err(PipelineError::validation("prepare_validation payload must be a JSON object"));
        };
        payload.entry("successful").or_insert(Value::Bool(true));
        let fingerprint = get_str(&payload, &["dataset_fingerprint", "datasetFingerprint"])
            .ok_or_else(|| PipelineError::validation("payload is missing dataset_fingerprint"))?;
        let payload = Value::Object(payload);

        let action = format!("{}/{}", fingerprint, stage::PREPARE_VALIDATION);
        let mut out = self
            .run_task(stage::PREPARE_VALIDATION, &action, JobKind::PrepareValidation, &payload)
            .await?;
        let report_uri = out.get("value").and_then(|v| find_first_str(v, REPORT_URI_KEYS));
        out.insert("report_uri", report_uri);

        let base = keys::validation_stage(&fingerprint, stage::PREPARE_VALIDATION)?;
        self.persist(&base, &payload, &mut out, "saved")?;
        metrics::record_stage(stage::PREPARE_VALIDATION, out.is_ok());
        Ok(out)
    }

    /// Submit the prepared validation for `fingerprint`.
    pub async fn register_validation(&self, args: RegisterValidationArgs) -> Result<StageOutput, PipelineError> {
        let network = self.network(args.network.as_deref());
        let fingerprint = require_id(&args.fingerprint, "fingerprint")?;

        let prepared_base = keys::validation_stage(fingerprint, stage::PREPARE_VALIDATION)?;
        let prepared_key = keys::response(&prepared_base)?;
        let artifact = load_stage(&self.store, &prepared_base)?;
        let prepared = prepared_value(&artifact.response, &prepared_key)?;

        let mut required = RequiredFields::new(&prepared);
        let validation_hash = required.str("validationHash", &["validation_hash"]);
        let result_uri = required.str("resultURI", &["result_uri"]);
        required.finish(&prepared_key)?;
        let report_uri = get_str(&prepared, &["reportURI", "report_uri"]).unwrap_or_default();
        let requested = artifact.request.as_ref().and_then(Value::as_object);
        let successful = get_bool(&prepared, "successful")
            .or_else(|| requested.and_then(|r| get_bool(r, "successful")))
            .unwrap_or(true);

        let contract = self.contract(&network, &self.config.contracts.validation_registry, &args.contract)?;
        let sender = self.wallet()?.address();
        let call = ContractCall::from_json(
            &contract,
            "submitValidation",
            &[
                json!(fingerprint),
                json!(validation_hash),
                json!(result_uri),
                json!(report_uri),
                json!(successful),
            ],
        )?;

        let request_meta = json!({
            "network": network,
            "registry_name": contract.name,
            "registry_address": contract.address,
            "dataset_fingerprint": fingerprint,
            "sender": sender,
            "call_args": {
                "validationHash": validation_hash,
                "resultURI": result_uri,
                "reportURI": report_uri,
                "successful": successful,
            },
            "prepared_key": prepared_key.as_str(),
        });

        let result = async {
            let tx = self.transact(&call, &args.fees, None).await?;
            let ingest = self
                .ingest(&network, &contract.address.to_string(), &tx.tx_hash.to_string(), self.options.poll)
                .await;
            Ok::<_, PipelineError>(
                StageOutput::success(stage::REGISTER_VALIDATION)
                    .with("network", &network)
                    .with("registry_address", contract.address)
                    .with("dataset_fingerprint", fingerprint)
                    .with("sender", sender)
                    .with("gas_estimate", tx.gas_estimate)
                    .with("tx_hash", tx.tx_hash)
                    .with("receipt", &tx.receipt.raw)
                    .with("ingest", ingest),
            )
        }
        .await;

        let base = keys::validation_stage(fingerprint, stage::REGISTER_VALIDATION)?;
        self.conclude(
            stage::REGISTER_VALIDATION,
            &base,
            &request_meta,
            result,
            json!({ "fn": "submitValidation" }),
        )
    }
}
