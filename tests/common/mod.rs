//! Shared fakes for the pipeline integration tests: a scripted job service,
//! an in-process ledger node, and a seeded contract registry.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use serde_json::{json, Value};

use chain_attest::artifacts::{
    keys, ArtifactKey, ArtifactStore, FsArtifactStore, MemoryArtifactStore, StoreError, StoreResult,
};
use chain_attest::blockchain::{BlockchainError, BlockchainResult, LedgerNode, ReceiptView, Wallet};
use chain_attest::config::AttestConfig;
use chain_attest::tasks::{
    JobKind, JobRequest, JobService, TaskError, TaskHandle, TaskResultPayload, TaskState, TaskStatus,
};
use chain_attest::{Pipeline, PipelineOptions};

pub const NETWORK: &str = "sepolia";
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const REQUEST_REGISTRY: &str = "0x1111111111111111111111111111111111111111";
pub const DATASET_REGISTRY: &str = "0x2222222222222222222222222222222222222222";
pub const VALIDATION_REGISTRY: &str = "0x3333333333333333333333333333333333333333";

/// Chain clock reported by [`FakeNode`] unless a test moves it.
pub const CHAIN_NOW: u64 = 1_700_000_000;
/// Comfortably after [`CHAIN_NOW`].
pub const FUTURE_DEADLINE: u64 = 4_000_000_000;

pub type TestPipeline = Pipeline<FakeJobs, FakeNode, MemoryArtifactStore>;

// ============================================================================
// Job service
// ============================================================================

#[derive(Debug, Clone)]
pub enum Script {
    Succeed(Value),
    Fail(String),
    Hang,
}

/// Job service whose jobs finish immediately with a per-kind script.
/// Unscripted kinds succeed with `{}`.
#[derive(Default)]
pub struct FakeJobs {
    scripts: Mutex<HashMap<JobKind, Script>>,
    tasks: Mutex<HashMap<String, JobKind>>,
    submitted: Mutex<Vec<JobRequest>>,
    next_id: AtomicU32,
}

impl FakeJobs {
    pub fn script(self, kind: JobKind, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(kind, script);
        self
    }

    pub fn submissions(&self, kind: JobKind) -> usize {
        self.submitted.lock().unwrap().iter().filter(|r| r.kind == kind).count()
    }

    pub fn last_payload(&self, kind: JobKind) -> Option<Value> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.kind == kind)
            .map(|r| r.payload.clone())
    }

    fn script_for(&self, task_id: &str) -> Script {
        let kind = self.tasks.lock().unwrap().get(task_id).copied();
        kind.and_then(|k| self.scripts.lock().unwrap().get(&k).cloned())
            .unwrap_or_else(|| Script::Succeed(json!({})))
    }
}

#[async_trait]
impl JobService for FakeJobs {
    async fn submit(&self, request: &JobRequest) -> Result<TaskHandle, TaskError> {
        let id = format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.tasks.lock().unwrap().insert(id.clone(), request.kind);
        self.submitted.lock().unwrap().push(request.clone());
        Ok(TaskHandle::new(id))
    }

    async fn status(&self, task_id: &str) -> Result<TaskStatus, TaskError> {
        Ok(match self.script_for(task_id) {
            Script::Succeed(value) => TaskStatus {
                result: Some(value),
                ..TaskStatus::new(TaskState::Success)
            },
            Script::Fail(message) => TaskStatus {
                error: Some(message),
                ..TaskStatus::new(TaskState::Failure)
            },
            Script::Hang => TaskStatus::new(TaskState::Started),
        })
    }

    async fn result(&self, _task_id: &str) -> Result<TaskResultPayload, TaskError> {
        Err(TaskError::Http {
            status: 404,
            body: "result endpoint disabled".into(),
        })
    }
}

// ============================================================================
// Ledger node
// ============================================================================

/// Ledger node that mines every transaction into block 100.
/// What `eth_getTransactionReceipt` reports once the node is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mining {
    Succeeded,
    Reverted,
    Never,
}

pub struct FakeNode {
    chain_now: AtomicU64,
    nonce: AtomicU64,
    gas_price: AtomicU64,
    revert: Mutex<Option<String>>,
    receipt_logs: Mutex<Vec<Value>>,
    mining: Mutex<Mining>,
    receipt_errors: AtomicU32,
    receipt_polls: AtomicU32,
    estimates: AtomicU32,
    broadcasts: AtomicU32,
    estimated_input: Mutex<Option<Bytes>>,
    last_raw: Mutex<Option<Bytes>>,
}

impl Default for FakeNode {
    fn default() -> Self {
        Self {
            chain_now: AtomicU64::new(CHAIN_NOW),
            nonce: AtomicU64::new(0),
            gas_price: AtomicU64::new(2_000_000_000),
            revert: Mutex::new(None),
            receipt_logs: Mutex::new(Vec::new()),
            mining: Mutex::new(Mining::Succeeded),
            receipt_errors: AtomicU32::new(0),
            receipt_polls: AtomicU32::new(0),
            estimates: AtomicU32::new(0),
            broadcasts: AtomicU32::new(0),
            estimated_input: Mutex::new(None),
            last_raw: Mutex::new(None),
        }
    }
}

impl FakeNode {
    pub fn with_chain_now(self, ts: u64) -> Self {
        self.chain_now.store(ts, Ordering::SeqCst);
        self
    }

    /// Value returned by `nonces(address)` view calls.
    pub fn with_registry_nonce(self, nonce: u64) -> Self {
        self.nonce.store(nonce, Ordering::SeqCst);
        self
    }

    /// Make every gas estimate fail with this node error text.
    pub fn reverting(self, message: &str) -> Self {
        *self.revert.lock().unwrap() = Some(message.to_string());
        self
    }

    pub fn with_logs(self, logs: Vec<Value>) -> Self {
        *self.receipt_logs.lock().unwrap() = logs;
        self
    }

    /// Legacy gas price reported by `eth_gasPrice`, in wei.
    pub fn with_gas_price(self, wei: u64) -> Self {
        self.gas_price.store(wei, Ordering::SeqCst);
        self
    }

    pub fn mining(self, mining: Mining) -> Self {
        *self.mining.lock().unwrap() = mining;
        self
    }

    /// Fail the next `count` receipt lookups with a connection error.
    pub fn failing_receipt_polls(self, count: u32) -> Self {
        self.receipt_errors.store(count, Ordering::SeqCst);
        self
    }

    pub fn receipt_polls(&self) -> u32 {
        self.receipt_polls.load(Ordering::SeqCst)
    }

    /// The last broadcast transaction, decoded.
    pub fn last_broadcast(&self) -> Option<TxEnvelope> {
        let raw = self.last_raw.lock().unwrap().clone()?;
        Some(TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap())
    }

    pub fn estimates(&self) -> u32 {
        self.estimates.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> u32 {
        self.broadcasts.load(Ordering::SeqCst)
    }

    /// Calldata of the most recent gas estimate.
    pub fn estimated_input(&self) -> Option<Bytes> {
        self.estimated_input.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerNode for FakeNode {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        Ok(11_155_111)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        Ok(100)
    }

    async fn latest_block_timestamp(&self) -> BlockchainResult<u64> {
        Ok(self.chain_now.load(Ordering::SeqCst))
    }

    async fn transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
        Ok(0)
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        Ok(u128::from(self.gas_price.load(Ordering::SeqCst)))
    }

    async fn call(&self, _tx: &TransactionRequest) -> BlockchainResult<Bytes> {
        let nonce = U256::from(self.nonce.load(Ordering::SeqCst));
        Ok(Bytes::from(nonce.to_be_bytes::<32>().to_vec()))
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> BlockchainResult<u64> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        *self.estimated_input.lock().unwrap() = tx.input.input().cloned();
        match self.revert.lock().unwrap().clone() {
            Some(message) => Err(BlockchainError::Rpc(message)),
            None => Ok(100_000),
        }
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        *self.last_raw.lock().unwrap() = Some(Bytes::copy_from_slice(raw));
        Ok(keccak256(raw))
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<ReceiptView>> {
        self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .receipt_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlockchainError::Rpc(
                "All RPC providers failed for eth_getTransactionReceipt: connection reset".into(),
            ));
        }
        let status = match *self.mining.lock().unwrap() {
            Mining::Never => return Ok(None),
            Mining::Succeeded => "0x1",
            Mining::Reverted => "0x0",
        };
        let logs = self.receipt_logs.lock().unwrap().clone();
        ReceiptView::from_json(json!({
            "transactionHash": alloy::hex::encode_prefixed(tx_hash),
            "blockNumber": "0x64",
            "status": status,
            "gasUsed": "0x186a0",
            "logs": logs,
        }))
        .map(Some)
    }
}

// ============================================================================
// Registry and store seeding
// ============================================================================

fn param(name: &str, ty: &str) -> Value {
    json!({ "name": name, "type": ty, "internalType": ty })
}

fn indexed(name: &str, ty: &str) -> Value {
    json!({ "name": name, "type": ty, "internalType": ty, "indexed": true })
}

fn function(name: &str, inputs: Vec<Value>, outputs: Vec<Value>, mutability: &str) -> Value {
    json!({
        "type": "function",
        "name": name,
        "inputs": inputs,
        "outputs": outputs,
        "stateMutability": mutability,
    })
}

fn event(name: &str, inputs: Vec<Value>) -> Value {
    json!({ "type": "event", "name": name, "inputs": inputs, "anonymous": false })
}

fn suite_params() -> Vec<Value> {
    vec![
        param("suiteHash", "bytes32"),
        param("suiteURI", "string"),
        param("docsURI", "string"),
        param("certificateURI", "string"),
        param("category", "string"),
        param("fileFormat", "string"),
        param("deadline", "uint256"),
        param("totalExpected", "uint256"),
    ]
}

pub fn request_registry_abi() -> Value {
    let mut with_sig = suite_params();
    with_sig.extend([
        param("nonce", "uint256"),
        param("expiresAt", "uint256"),
        param("signature", "bytes"),
    ]);
    json!([
        function("createDatasetRequest", suite_params(), vec![param("", "uint256")], "payable"),
        function("createDatasetRequestWithSig", with_sig, vec![param("", "uint256")], "payable"),
        function(
            "claimRewardForDatasetAndMint",
            vec![
                param("id", "uint256"),
                param("datasetFingerprint", "bytes32"),
                param("nftCategory", "string"),
                param("level", "string"),
                param("metadataURI", "string"),
                param("deadline", "uint256"),
                param("claimSignature", "bytes"),
            ],
            vec![],
            "nonpayable",
        ),
        event(
            "DatasetRequestCreated",
            vec![
                indexed("requestId", "uint256"),
                indexed("requester", "address"),
                indexed("suiteHash", "bytes32"),
            ],
        ),
    ])
}

pub fn dataset_registry_abi() -> Value {
    json!([
        function("nonces", vec![param("owner", "address")], vec![param("", "uint256")], "view"),
        function(
            "registerDataset",
            vec![
                param("uri", "string"),
                param("suiteHash", "bytes32"),
                param("fileFormat", "string"),
                param("reportUri", "string"),
                param("nonce", "uint256"),
                param("signature", "bytes"),
            ],
            vec![],
            "nonpayable",
        ),
        event(
            "DatasetRegistered",
            vec![
                indexed("datasetId", "uint256"),
                indexed("uploader", "address"),
                indexed("fingerprint", "bytes32"),
            ],
        ),
    ])
}

pub fn validation_registry_abi() -> Value {
    json!([function(
        "submitValidation",
        vec![
            param("fingerprint", "bytes32"),
            param("validationHash", "bytes32"),
            param("resultURI", "string"),
            param("reportURI", "string"),
            param("successful", "bool"),
        ],
        vec![],
        "nonpayable",
    )])
}

/// Store holding the contract index and ABIs for [`NETWORK`].
pub fn seeded_store() -> MemoryArtifactStore {
    let store = MemoryArtifactStore::new();
    seed_registry(&store);
    store
}

/// Empty filesystem store under the system temp directory, unique per test name.
pub fn temp_store(name: &str) -> FsArtifactStore {
    let dir = std::env::temp_dir().join(format!("attest-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    FsArtifactStore::open(&dir).unwrap()
}

pub fn seed_registry<S: ArtifactStore>(store: &S) {
    let contracts = [
        ("DatasetRequestRegistry", REQUEST_REGISTRY, request_registry_abi()),
        ("DatasetRegistry", DATASET_REGISTRY, dataset_registry_abi()),
        ("ValidationRegistry", VALIDATION_REGISTRY, validation_registry_abi()),
    ];
    let index: Vec<Value> = contracts
        .iter()
        .map(|(name, address, _)| json!({ "name": name, "address": address }))
        .collect();
    store
        .write_json(&keys::contract_index(NETWORK).unwrap(), &json!({ "contracts": index }))
        .unwrap();
    for (_, address, abi) in &contracts {
        store.write_json(&keys::contract_abi(NETWORK, address).unwrap(), abi).unwrap();
    }
}

/// Write a latest request/response pair under `base`.
pub fn seed_stage(store: &MemoryArtifactStore, base: &ArtifactKey, request: Value, response: Value) {
    store.write_json(&keys::request(base).unwrap(), &request).unwrap();
    store.write_json(&keys::response(base).unwrap(), &response).unwrap();
}

/// A persisted prepare response whose job succeeded with `value`.
pub fn prepared(stage: &str, value: Value) -> Value {
    json!({
        "ok": true,
        "stage": stage,
        "outcome": { "outcome": "succeeded", "value": value },
        "value": value,
    })
}

pub fn read(store: &MemoryArtifactStore, key: &ArtifactKey) -> Option<Value> {
    store.read_json(key).unwrap()
}

pub fn read_response(store: &MemoryArtifactStore, base: &ArtifactKey) -> Option<Value> {
    read(store, &keys::response(base).unwrap())
}

/// Memory store whose read-modify-write updates under `expectations/` (the
/// suite/dataset link sets) always fail.
pub struct LinkFailingStore {
    inner: MemoryArtifactStore,
}

impl LinkFailingStore {
    pub fn new(inner: MemoryArtifactStore) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &MemoryArtifactStore {
        &self.inner
    }
}

impl ArtifactStore for LinkFailingStore {
    fn write_json(&self, key: &ArtifactKey, value: &Value) -> StoreResult<String> {
        self.inner.write_json(key, value)
    }

    fn read_json(&self, key: &ArtifactKey) -> StoreResult<Option<Value>> {
        self.inner.read_json(key)
    }

    fn write_bytes(&self, key: &ArtifactKey, data: &[u8], ext: &str) -> StoreResult<String> {
        self.inner.write_bytes(key, data, ext)
    }

    fn read_bytes(&self, key: &ArtifactKey, ext: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.read_bytes(key, ext)
    }

    fn delete(&self, key: &ArtifactKey) -> StoreResult<bool> {
        self.inner.delete(key)
    }

    fn compare_and_swap(&self, key: &ArtifactKey, expected: Option<&Value>, new: &Value) -> StoreResult<bool> {
        if key.as_str().starts_with("expectations/") {
            return Err(StoreError::LockContended(key.to_string()));
        }
        self.inner.compare_and_swap(key, expected, new)
    }
}

// ============================================================================
// Pipeline and log helpers
// ============================================================================

pub fn test_config() -> AttestConfig {
    let mut config = AttestConfig::default();
    config.ledger.network = NETWORK.to_string();
    config.ledger.receipt_timeout_secs = 5;
    config.ledger.receipt_poll_interval_ms = 10;
    config.polling.timeout_secs = 2.0;
    config.polling.interval_secs = 0.1;
    config
}

pub fn test_wallet() -> Wallet {
    Wallet::from_private_key(TEST_KEY).unwrap()
}

pub fn pipeline(jobs: FakeJobs, node: FakeNode, store: MemoryArtifactStore) -> TestPipeline {
    Pipeline::new(jobs, node, store, test_config()).with_wallet(test_wallet())
}

pub fn strict(pipeline: TestPipeline) -> TestPipeline {
    let options = PipelineOptions {
        strict: true,
        ..pipeline.options().clone()
    };
    pipeline.with_options(options)
}

pub fn hash32(byte: u8) -> String {
    format!("0x{}", hex_byte(byte).repeat(32))
}

fn hex_byte(byte: u8) -> String {
    format!("{:02x}", byte)
}

/// A 65-byte signature whose recovery byte is `v`.
pub fn raw_signature(v: u8) -> String {
    format!("0x{}{}", "ab".repeat(64), hex_byte(v))
}

pub fn topic_u64(n: u64) -> String {
    alloy::hex::encode_prefixed(B256::from(U256::from(n)))
}

pub fn topic_address(address: &str) -> String {
    let address: Address = address.parse().unwrap();
    alloy::hex::encode_prefixed(address.into_word())
}

pub fn event_topic(signature: &str) -> String {
    alloy::hex::encode_prefixed(keccak256(signature.as_bytes()))
}

/// Selector of a function signature such as `nonces(address)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn request_created_log(request_id: u64, suite_hash: &str) -> Value {
    json!({
        "address": REQUEST_REGISTRY,
        "topics": [
            event_topic("DatasetRequestCreated(uint256,address,bytes32)"),
            topic_u64(request_id),
            topic_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            suite_hash,
        ],
        "data": "0x",
    })
}

pub fn dataset_registered_log(dataset_id: u64, fingerprint: &str) -> Value {
    json!({
        "address": DATASET_REGISTRY,
        "topics": [
            event_topic("DatasetRegistered(uint256,address,bytes32)"),
            topic_u64(dataset_id),
            topic_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            fingerprint,
        ],
        "data": "0x",
    })
}
