//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, B256};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::artifacts::StoreError;
use crate::signing::SigningError;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out on every provider.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// No receipt with enough confirmations before the deadline.
    #[error("Transaction {tx_hash} not confirmed after {waited_secs} seconds")]
    ConfirmationTimeout { tx_hash: TxHash, waited_secs: u64 },

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Network name missing from the ledger configuration.
    #[error("Unknown network '{0}'")]
    UnknownNetwork(String),

    /// Contract registry cache is missing or unusable.
    #[error("Contract registry: {0}")]
    Registry(String),

    /// ABI lookup or argument encoding failed.
    #[error("ABI error: {0}")]
    Abi(String),

    /// Receipt or log payload could not be interpreted.
    #[error("Malformed receipt: {0}")]
    Receipt(String),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BlockchainError {
    /// Whether the node reported the call as reverted by the contract.
    pub fn is_revert(&self) -> bool {
        match self {
            BlockchainError::Rpc(text) => {
                text.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        }
    }
}

/// Result type for ledger operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// One emitted log, independent of the RPC client types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogView {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// A mined transaction receipt.
///
/// Built from the node's JSON so that a receipt persisted by an earlier run
/// can be read back through the same path.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptView {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub status: bool,
    pub gas_used: Option<u64>,
    pub logs: Vec<LogView>,
    /// The receipt as returned by the node.
    pub raw: Value,
}

impl ReceiptView {
    pub fn from_json(raw: Value) -> BlockchainResult<Self> {
        let obj = raw
            .as_object()
            .ok_or_else(|| BlockchainError::Receipt("receipt is not an object".into()))?;

        let transaction_hash = match obj.get("transactionHash").and_then(Value::as_str) {
            Some(s) => s
                .parse::<TxHash>()
                .map_err(|e| BlockchainError::Receipt(format!("transactionHash: {}", e)))?,
            None => TxHash::ZERO,
        };
        let block_number = obj.get("blockNumber").and_then(quantity);
        let gas_used = obj.get("gasUsed").and_then(quantity);
        // Pre-byzantium receipts carry a root instead of a status.
        let status = match obj.get("status") {
            Some(Value::Bool(ok)) => *ok,
            Some(v) => quantity(v).map(|s| s == 1).unwrap_or(true),
            None => true,
        };

        let logs = match obj.get("logs") {
            Some(Value::Array(items)) => items
                .iter()
                .map(LogView::from_json)
                .collect::<BlockchainResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        Ok(Self {
            transaction_hash,
            block_number,
            status,
            gas_used,
            logs,
            raw,
        })
    }
}

impl LogView {
    pub fn from_json(raw: &Value) -> BlockchainResult<Self> {
        let address = raw
            .get("address")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .parse::<Address>()
            .map_err(|e| BlockchainError::Receipt(format!("log address: {}", e)))?;
        let topics = match raw.get("topics") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|t| {
                    t.parse::<B256>()
                        .map_err(|e| BlockchainError::Receipt(format!("log topic '{}': {}", t, e)))
                })
                .collect::<BlockchainResult<Vec<_>>>()?,
            _ => Vec::new(),
        };
        let data = match raw.get("data").and_then(Value::as_str) {
            Some(hex) if !hex.is_empty() && hex != "0x" => hex
                .parse::<Bytes>()
                .map_err(|e| BlockchainError::Receipt(format!("log data: {}", e)))?,
            _ => Bytes::new(),
        };
        Ok(Self {
            address,
            topics,
            data,
        })
    }
}

/// Outcome of a confirmed submission.
#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub tx_hash: TxHash,
    pub gas_estimate: u64,
    pub receipt: ReceiptView,
}

/// Parse a JSON-RPC quantity: `"0x1a"`, a decimal string, or a number.
pub(crate) fn quantity(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}
