//! Pipeline orchestration.
//!
//! # Data Flow
//! ```text
//! prepare_*  → TaskPoller::run → StageRecorder (audit snapshots, latest pair)
//! register_* → fields.rs (predecessor response read back from the store)
//!            → signing (hash, sign or normalize) → ChainSubmitter
//!            → StageRecorder (latest pair, success or captured failure)
//!            → ingest (job service indexes the transaction)
//! ```
//!
//! # Design Decisions
//! - Stages read their predecessor only from the store, so each one can be
//!   invoked on its own after a crash
//! - Reverts, failed jobs, past deadlines and unconfirmed transactions are
//!   persisted as failed outputs; strict mode raises reverts and failed jobs
//! - Every other error is returned to the caller and nothing is persisted

mod dataset;
mod fields;
mod output;
mod reward;
mod suite;
mod validation;

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::artifacts::{ArtifactKey, ArtifactStore, StageRecorder};
use crate::blockchain::{
    ChainSubmitter, ContractCall, ContractRegistry, FeeOverrides, LedgerNode, ResolvedContract,
    TransactionResult, Wallet,
};
use crate::config::{AttestConfig, PollingConfig};
use crate::error::PipelineError;
use crate::observability::metrics;
use crate::tasks::{JobKind, JobRequest, JobService, TaskHandle, TaskOutcome, TaskPoller, TaskStatus};

pub use dataset::{PrepareReportArgs, RegisterDatasetArgs};
pub use output::{StageFailure, StageOutput};
pub use reward::{ClaimRewardArgs, PrepareRewardArgs};
pub use suite::{pick_method, CallMethod, RegisterSuiteArgs};
pub use validation::RegisterValidationArgs;

/// Per-invocation behaviour shared by every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Wait for remote jobs (prepare and ingest) to finish.
    pub poll: bool,
    pub timeout: Duration,
    pub interval: Duration,
    /// Write nothing to the artifact store.
    pub no_store: bool,
    /// Raise remote job failures and reverts instead of persisting them.
    pub strict: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

impl PipelineOptions {
    pub fn from_config(polling: &PollingConfig) -> Self {
        Self {
            poll: true,
            timeout: polling.timeout(),
            interval: polling.interval(),
            no_store: false,
            strict: false,
        }
    }
}

/// Contract a submit stage talks to: a logical name from the registry index,
/// or an explicit address.
#[derive(Debug, Clone, Default)]
pub struct ContractTarget {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Reference to the backend ingest job for a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRecord {
    pub task: Option<TaskHandle>,
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs workflow stages against one job service, ledger node and store.
pub struct Pipeline<J, L, S> {
    jobs: J,
    node: L,
    store: S,
    config: AttestConfig,
    wallet: Option<Wallet>,
    options: PipelineOptions,
}

impl<J: JobService, L: LedgerNode, S: ArtifactStore> Pipeline<J, L, S> {
    pub fn new(jobs: J, node: L, store: S, config: AttestConfig) -> Self {
        let options = PipelineOptions::from_config(&config.polling);
        Self {
            jobs,
            node,
            store,
            config,
            wallet: None,
            options,
        }
    }

    /// Attach the signing key used for transactions and dataset signatures.
    pub fn with_wallet(mut self, wallet: Wallet) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    pub fn node(&self) -> &L {
        &self.node
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &AttestConfig {
        &self.config
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Re-populate the contract registry cache for `network`.
    pub async fn refresh_contracts(&self, network: Option<&str>, per_page: u32) -> Result<StageOutput, PipelineError> {
        let network = self.network(network);
        let summaries = ContractRegistry::new(&self.store)
            .refresh(&self.jobs, &network, per_page)
            .await?;
        let index = crate::artifacts::keys::contract_index(&network)?;
        Ok(StageOutput::success("refresh_contracts")
            .with("network", &network)
            .with("count", summaries.len())
            .with("index", index.as_str())
            .with("contracts", &summaries))
    }

    /// Ask the job service to index a broadcast transaction.
    ///
    /// Never fails: the transaction is already on-chain, so an ingest problem
    /// is reported in the record instead of failing the stage.
    pub async fn ingest(&self, network: &str, address: &str, tx_hash: &str, poll: bool) -> IngestRecord {
        let request = JobRequest::new(
            JobKind::IngestTx,
            json!({ "network": network, "address": address, "tx_hash": tx_hash }),
        );
        match TaskPoller::new(&self.jobs)
            .run(&request, poll, self.options.timeout, self.options.interval)
            .await
        {
            Ok(run) => IngestRecord {
                task: Some(run.handle),
                status: run.status,
                error: None,
            },
            Err(e) => {
                tracing::warn!(tx_hash, error = %e, "Ingest submission failed");
                IngestRecord {
                    task: None,
                    status: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn network(&self, network: Option<&str>) -> String {
        network
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.config.ledger.network)
            .to_string()
    }

    fn recorder(&self) -> StageRecorder<'_, S> {
        StageRecorder::new(&self.store, self.options.no_store)
    }

    fn wallet(&self) -> Result<&Wallet, PipelineError> {
        self.wallet
            .as_ref()
            .ok_or_else(|| PipelineError::validation("this stage needs a signing key, but none was configured"))
    }

    fn contract(
        &self,
        network: &str,
        default_name: &str,
        target: &ContractTarget,
    ) -> Result<ResolvedContract, PipelineError> {
        let name = target.name.as_deref().unwrap_or(default_name);
        Ok(ContractRegistry::new(&self.store).resolve(network, name, target.address.as_deref())?)
    }

    /// Submit a prepare job, optionally wait for it, and record audit
    /// snapshots and a log entry under `blockchain/<action>`.
    async fn run_task(
        &self,
        stage: &'static str,
        action: &str,
        kind: JobKind,
        payload: &Value,
    ) -> Result<StageOutput, PipelineError> {
        let recorder = self.recorder();
        let mut saved = Map::new();
        saved.insert("request".into(), json!(recorder.snapshot(action, "request", payload)?));

        let run = TaskPoller::new(&self.jobs)
            .run(
                &JobRequest::new(kind, payload.clone()),
                self.options.poll,
                self.options.timeout,
                self.options.interval,
            )
            .await?;
        let task_id = run.handle.task_id.clone();
        tracing::info!(stage, task_id = %task_id, "Prepare job submitted");

        saved.insert(
            "taskref".into(),
            json!(recorder.snapshot(action, "taskref", &json!(run.handle))?),
        );
        if let Some(status) = &run.status {
            saved.insert("status".into(), json!(recorder.snapshot(action, "status", &json!(status))?));
        }
        if let Some(value) = run.outcome.value() {
            saved.insert("result".into(), json!(recorder.snapshot(action, "result", value)?));
        }

        let mut out = match &run.outcome {
            TaskOutcome::Failed { message } => {
                let err = PipelineError::RemoteJobFailure {
                    task_id: task_id.clone(),
                    message: message.clone(),
                };
                if self.options.strict {
                    recorder.append_log(action, false, json!({ "task_id": task_id, "saved": saved }))?;
                    metrics::record_stage(stage, false);
                    return Err(err);
                }
                StageOutput::failure(stage, &err, Some(json!({ "task_id": task_id })))
            }
            _ => StageOutput::success(stage),
        };
        out.insert("task", &run.handle);
        out.insert("status", &run.status);
        out.insert("outcome", &run.outcome);
        out.insert("value", run.outcome.value());
        if self.options.poll && !run.status.as_ref().is_some_and(TaskStatus::is_ready) {
            out.insert("timed_out", true);
            out.warn(PipelineError::Timeout { task_id: task_id.clone() }.to_string());
        }

        recorder.append_log(action, out.is_ok(), json!({ "task_id": task_id, "saved": saved }))?;
        Ok(out)
    }

    /// Write `request`/`out` as the latest pair under `base`, noting the
    /// locations in `out[field]`.
    fn persist(&self, base: &ArtifactKey, request: &Value, out: &mut StageOutput, field: &str) -> Result<(), PipelineError> {
        if let Some(saved) = self.recorder().write_latest_pair(base, request, &out.to_json())? {
            out.insert(field, saved);
        }
        Ok(())
    }

    /// Deadline precheck, then estimate, sign, broadcast and confirm.
    async fn transact(
        &self,
        call: &ContractCall,
        fees: &FeeOverrides,
        deadline: Option<u64>,
    ) -> Result<TransactionResult, PipelineError> {
        if let Some(deadline) = deadline {
            let chain_now = self.node.latest_block_timestamp().await?;
            if deadline <= chain_now {
                tracing::warn!(function = call.name(), deadline, chain_now, "Deadline already passed");
                return Err(PipelineError::DeadlinePast { deadline, chain_now });
            }
        }
        ChainSubmitter::new(&self.node, self.wallet()?, &self.config.ledger)
            .submit(call, fees)
            .await
    }

    /// Turn a submit stage's result into its persisted output. Captured
    /// failures become a failed output; everything else propagates. A failure
    /// after broadcast is always persisted with its `tx_hash` unless strict
    /// mode raises it.
    fn conclude(
        &self,
        stage: &'static str,
        base: &ArtifactKey,
        request_meta: &Value,
        result: Result<StageOutput, PipelineError>,
        details: Value,
    ) -> Result<StageOutput, PipelineError> {
        let mut out = match result {
            Ok(out) => out,
            Err(err) if self.captures(&err) => {
                tracing::warn!(stage, code = err.code(), error = %err, "Stage failed");
                let mut out = StageOutput::failure(stage, &err, Some(details));
                if let Some(tx_hash) = err.tx_hash() {
                    out.insert("tx_hash", tx_hash);
                }
                out
            }
            Err(err) => {
                metrics::record_stage(stage, false);
                return Err(err);
            }
        };
        self.persist(base, request_meta, &mut out, "saved")?;
        metrics::record_stage(stage, out.is_ok());
        Ok(out)
    }

    fn captures(&self, err: &PipelineError) -> bool {
        let capturable = matches!(
            err,
            PipelineError::ChainRevert { .. }
                | PipelineError::RemoteJobFailure { .. }
                | PipelineError::DeadlinePast { .. }
                | PipelineError::Broadcast { .. }
        );
        capturable && !(self.options.strict && err.is_strict_fatal())
    }
}

/// Trimmed identifier, rejecting empty input.
fn require_id<'a>(value: &'a str, what: &str) -> Result<&'a str, PipelineError> {
    match value.trim() {
        "" => Err(PipelineError::validation(format!("{} must not be empty", what))),
        id => Ok(id),
    }
}
