//! Suite workflow: prepare the suite artifacts, then open a dataset request
//! on the request registry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::fields::{find_first_str, get_int, get_str, load_stage, prepared_value, RequiredFields};
use super::{require_id, ContractTarget, Pipeline, StageOutput};
use crate::artifacts::{keys, keys::stage, ArtifactStore, RelationSets};
use crate::blockchain::{ether_to_wei, extract_identifier, ContractCall, EventField, FeeOverrides, LedgerNode};
use crate::error::PipelineError;
use crate::observability::metrics;
use crate::signing::normalize_signature;
use crate::tasks::{JobKind, JobService};

pub(crate) const SUITE_HASH_KEYS: &[&str] = &["suiteHash", "suite_hash", "suitehash", "hash"];

/// Which registry entry point a suite registration uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMethod {
    /// `createDatasetRequest`
    Plain,
    /// `createDatasetRequestWithSig`, carrying the backend's nonce, expiry and signature.
    Sig,
}

impl CallMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallMethod::Plain => "plain",
            CallMethod::Sig => "sig",
        }
    }

    fn function(&self) -> &'static str {
        match self {
            CallMethod::Plain => "createDatasetRequest",
            CallMethod::Sig => "createDatasetRequestWithSig",
        }
    }
}

/// `Sig` exactly when signature, nonce and expiry are all present, unless a
/// method is forced.
pub fn pick_method(fields: &Map<String, Value>, forced: Option<CallMethod>) -> CallMethod {
    if let Some(method) = forced {
        return method;
    }
    let signature = get_str(fields, &["signature"]);
    let nonce = get_int(fields, &["nonce"]);
    let expires_at = get_int(fields, &["expiresAt", "expires_at"]);
    if signature.is_some() && nonce.is_some() && expires_at.is_some() {
        CallMethod::Sig
    } else {
        CallMethod::Plain
    }
}

#[derive(Debug, Clone)]
pub struct RegisterSuiteArgs {
    pub network: Option<String>,
    pub suite_id: String,
    /// Native value attached to the request, in ether.
    pub bounty_eth: f64,
    pub method: Option<CallMethod>,
    pub contract: ContractTarget,
    pub fees: FeeOverrides,
}

impl RegisterSuiteArgs {
    pub fn new(suite_id: impl Into<String>, bounty_eth: f64) -> Self {
        Self {
            network: None,
            suite_id: suite_id.into(),
            bounty_eth,
            method: None,
            contract: ContractTarget::default(),
            fees: FeeOverrides::default(),
        }
    }
}

impl<J: JobService, L: LedgerNode, S: ArtifactStore> Pipeline<J, L, S> {
    /// Submit the prepare-suite job.
    ///
    /// When the payload names no dataset, the datasets already linked to the
    /// suite are added as `dataset_ids`. The latest pair is written under the
    /// suite and under its first dataset.
    pub async fn prepare_suite(&self, payload: Value) -> Result<StageOutput, PipelineError> {
        let Value::Object(mut payload) = payload else {
            return Err(PipelineError::validation("prepare_suite payload must be a JSON object"));
        };
        let suite_id = get_str(&payload, &["suite_id", "expectations_suite_id", "expectation_suite_id"]);

        if let Some(suite_id) = &suite_id {
            if !payload.contains_key("dataset_id") && !payload.contains_key("dataset_ids") {
                let linked = RelationSets::new(&self.store).datasets_for_suite(suite_id)?;
                if !linked.is_empty() {
                    tracing::debug!(suite_id = %suite_id, datasets = linked.len(), "Adding linked datasets");
                    payload.insert("dataset_ids".to_string(), json!(linked));
                }
            }
        }
        let first_dataset = get_str(&payload, &["dataset_id"]).or_else(|| {
            payload
                .get("dataset_ids")
                .and_then(Value::as_array)
                .and_then(|ids| ids.iter().filter_map(Value::as_str).map(str::trim).find(|s| !s.is_empty()))
                .map(str::to_string)
        });
        let payload = Value::Object(payload);

        let action = format!("{}/{}", suite_id.as_deref().unwrap_or("unknown"), stage::PREPARE_SUITE);
        let mut out = self
            .run_task(stage::PREPARE_SUITE, &action, JobKind::PrepareSuite, &payload)
            .await?;
        let suite_hash = out.get("value").and_then(|v| find_first_str(v, SUITE_HASH_KEYS));
        out.insert("suite_hash", suite_hash);

        match &suite_id {
            Some(suite_id) => {
                self.persist(&keys::suite_stage(suite_id, stage::PREPARE_SUITE)?, &payload, &mut out, "saved")?;
                match &first_dataset {
                    Some(dataset_id) => {
                        let base = keys::dataset_stage(suite_id, dataset_id, stage::PREPARE_SUITE)?;
                        self.persist(&base, &payload, &mut out, "saved_dataset")?;
                    }
                    None => out.warn("no dataset is linked to this suite; dataset-level artifacts were not written"),
                }
            }
            None => out.warn("payload has no suite_id; latest artifacts were not written"),
        }

        metrics::record_stage(stage::PREPARE_SUITE, out.is_ok());
        Ok(out)
    }

    /// Create the dataset request for a prepared suite.
    pub async fn register_suite(&self, args: RegisterSuiteArgs) -> Result<StageOutput, PipelineError> {
        let network = self.network(args.network.as_deref());
        let suite_id = require_id(&args.suite_id, "suite_id")?;

        let prepared_base = keys::suite_stage(suite_id, stage::PREPARE_SUITE)?;
        let request_key = keys::request(&prepared_base)?;
        let response_key = keys::response(&prepared_base)?;
        let artifact = load_stage(&self.store, &prepared_base)?;
        let mut merged = artifact
            .request
            .as_ref()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        merged.extend(prepared_value(&artifact.response, &response_key)?);

        let mut required = RequiredFields::new(&merged);
        let suite_hash = required.str("suiteHash", &["suite_hash"]);
        let suite_uri = required.str("suiteURI", &["suite_uri"]);
        let certificate_uri = required.str("certificateURI", &["certificate_uri"]);
        let category = required.str("category", &[]);
        let file_format = required.str("fileFormat", &["file_format"]);
        let deadline = required.int("deadline", &[]);
        let total_expected = required.int("totalExpected", &["total_expected"]);
        required.finish(&response_key)?;
        let docs_uri = get_str(&merged, &["docsURI", "docs_uri"]).unwrap_or_default();

        let method = pick_method(&merged, args.method);
        let mut call_args = vec![
            json!(suite_hash),
            json!(suite_uri),
            json!(docs_uri),
            json!(certificate_uri),
            json!(category),
            json!(file_format),
            json!(deadline),
            json!(total_expected),
        ];
        let mut sig_meta = Value::Null;
        if method == CallMethod::Sig {
            let nonce = get_int(&merged, &["nonce"]);
            let expires_at = get_int(&merged, &["expiresAt", "expires_at"]);
            let signature = get_str(&merged, &["signature"]);
            let (Some(nonce), Some(expires_at), Some(signature)) = (nonce, expires_at, signature) else {
                return Err(PipelineError::missing(
                    &response_key,
                    "method sig needs nonce, expiresAt and signature",
                ));
            };
            let signature = normalize_signature(&signature)?;
            call_args.extend([json!(nonce), json!(expires_at), json!(signature.to_hex())]);
            sig_meta = json!({ "nonce": nonce, "expiresAt": expires_at });
        }

        let contract = self.contract(&network, &self.config.contracts.request_registry, &args.contract)?;
        let sender = self.wallet()?.address();
        let call = ContractCall::from_json(&contract, method.function(), &call_args)?
            .with_value(ether_to_wei(args.bounty_eth));

        let request_meta = json!({
            "network": network,
            "suite_id": suite_id,
            "registry_name": contract.name,
            "registry_address": contract.address,
            "method": method,
            "bounty_eth": args.bounty_eth,
            "sender": sender,
            "call_args": {
                "suiteHash": suite_hash,
                "suiteURI": suite_uri,
                "docsURI": docs_uri,
                "certificateURI": certificate_uri,
                "category": category,
                "fileFormat": file_format,
                "deadline": deadline,
                "totalExpected": total_expected,
            },
            "sig": sig_meta,
            "prepare_request_key": request_key.as_str(),
            "prepare_response_key": response_key.as_str(),
        });

        let result = async {
            let tx = self.transact(&call, &args.fees, Some(deadline)).await?;
            let request_id = extract_identifier(
                &tx.receipt.logs,
                EventField {
                    abi: Some(&contract.abi),
                    event: &self.config.contracts.request_created_event,
                    field: &self.config.contracts.request_id_field,
                    emitter: Some(contract.address),
                },
            );
            if request_id.is_none() {
                tracing::warn!(tx_hash = %tx.tx_hash, "No request id found in receipt logs");
            }
            let ingest = self
                .ingest(&network, &contract.address.to_string(), &tx.tx_hash.to_string(), self.options.poll)
                .await;
            Ok::<_, PipelineError>(
                StageOutput::success(stage::REGISTER_SUITE)
                    .with("network", &network)
                    .with("registry_address", contract.address)
                    .with("suite_id", suite_id)
                    .with("method", method)
                    .with("sender", sender)
                    .with("bounty_eth", args.bounty_eth)
                    .with("gas_estimate", tx.gas_estimate)
                    .with("tx_hash", tx.tx_hash)
                    .with("receipt", &tx.receipt.raw)
                    .with("request_id", request_id)
                    .with("ingest", ingest),
            )
        }
        .await;

        let base = keys::suite_stage(suite_id, stage::REGISTER_SUITE)?;
        self.conclude(
            stage::REGISTER_SUITE,
            &base,
            &request_meta,
            result,
            json!({ "method": method }),
        )
    }
}
