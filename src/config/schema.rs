//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the attestation
//! pipeline. All types derive Serde traits for deserialization from config files.
//! Secrets (signing key, bearer token) are deliberately absent: they are passed
//! in separately as [`Secrets`] by the binary.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the attestation pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AttestConfig {
    /// Remote asynchronous job service.
    pub job_service: JobServiceConfig,

    /// Ledger node connectivity and transaction policy.
    pub ledger: LedgerConfig,

    /// Artifact store location.
    pub storage: StorageConfig,

    /// Default polling behaviour for remote jobs.
    pub polling: PollingConfig,

    /// Retry configuration for idempotent job-service reads.
    pub retries: RetryConfig,

    /// Logical contract names and the events used for identifier extraction.
    pub contracts: ContractsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Remote job service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JobServiceConfig {
    /// Base URL (e.g., "https://backend.example.org").
    pub base_url: String,

    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,

    /// Endpoint paths, relative to `base_url`.
    pub endpoints: JobEndpoints,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 240,
            endpoints: JobEndpoints::default(),
        }
    }
}

/// Job service endpoint paths.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JobEndpoints {
    pub prepare_suite: String,
    pub prepare_reward: String,
    pub prepare_validation: String,
    pub prepare_report: String,
    pub ingest_tx: String,
    /// Status path prefix; the task id is appended.
    pub task_status: String,
    /// Result path prefix; the task id is appended.
    pub task_result: String,
    /// Contract listing used to refresh the registry cache.
    pub contracts: String,
}

impl Default for JobEndpoints {
    fn default() -> Self {
        Self {
            prepare_suite: "/ddm/blockchain/suites/prepare".to_string(),
            prepare_reward: "/ddm/blockchain/rewards/prepare".to_string(),
            prepare_validation: "/ddm/blockchain/validations/prepare".to_string(),
            prepare_report: "/ddm/blockchain/register_datasets/prepare_report".to_string(),
            ingest_tx: "/ddm/blockchain/ingest-tx".to_string(),
            task_status: "/ddm/tasks/status".to_string(),
            task_result: "/ddm/tasks/result".to_string(),
            contracts: "/ddm/blockchain/contracts".to_string(),
        }
    }
}

/// Ledger integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Network used when a stage does not name one.
    pub network: String,

    /// JSON-RPC endpoint per network name.
    pub networks: BTreeMap<String, NetworkConfig>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Number of block confirmations required before a receipt counts.
    pub confirmation_blocks: u32,

    /// Maximum time to wait for a receipt, in seconds.
    pub receipt_timeout_secs: u64,

    /// Receipt poll interval in milliseconds.
    pub receipt_poll_interval_ms: u64,

    /// Gas limit multiplier applied to the estimate (1.2 = 20% headroom).
    pub gas_limit_multiplier: f64,

    /// Gas price multiplier for legacy pricing (1.0 = node suggestion).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert("sepolia".to_string(), NetworkConfig::default());
        Self {
            network: "sepolia".to_string(),
            networks,
            rpc_timeout_secs: 10,
            confirmation_blocks: 1,
            receipt_timeout_secs: 300,
            receipt_poll_interval_ms: 2000,
            gas_limit_multiplier: 1.2,
            gas_price_multiplier: 1.0,
            max_gas_price_gwei: 500,
        }
    }
}

impl LedgerConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

/// Per-network RPC settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Expected chain id; verified on connect when set.
    pub chain_id: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: None,
        }
    }
}

/// Artifact store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; keys map to `<root>/<key>.json`.
    pub root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "./attest-data".to_string(),
        }
    }
}

/// Default polling behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Overall deadline in seconds.
    pub timeout_secs: f64,

    /// Sleep between polls in seconds.
    pub interval_secs: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300.0,
            interval_secs: 1.0,
        }
    }
}

impl PollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs.max(0.0))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs.max(0.0))
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// Contract names in the registry index and the events that carry identifiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractsConfig {
    pub request_registry: String,
    pub dataset_registry: String,
    pub validation_registry: String,

    /// Event emitted by the request registry on creation.
    pub request_created_event: String,
    /// Indexed field holding the request id.
    pub request_id_field: String,

    /// Event emitted by the dataset registry on registration.
    pub dataset_registered_event: String,
    /// Indexed field holding the dataset fingerprint.
    pub fingerprint_field: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            request_registry: "DatasetRequestRegistry".to_string(),
            dataset_registry: "DatasetRegistry".to_string(),
            validation_registry: "ValidationRegistry".to_string(),
            request_created_event: "DatasetRequestCreated".to_string(),
            request_id_field: "requestId".to_string(),
            dataset_registered_event: "DatasetRegistered".to_string(),
            fingerprint_field: "fingerprint".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Record pipeline metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

/// Credentials supplied by the caller, never read from config files.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Hex private key used to sign messages and transactions.
    pub signer_key: Option<String>,
    /// Bearer token for the job service.
    pub backend_token: Option<String>,
    /// RPC URL overriding the configured one for the selected network.
    pub rpc_url: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("signer_key", &self.signer_key.as_ref().map(|_| "<redacted>"))
            .field("backend_token", &self.backend_token.as_ref().map(|_| "<redacted>"))
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}
