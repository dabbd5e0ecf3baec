//! The ledger node seam.

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

use crate::blockchain::types::{BlockchainResult, ReceiptView};

/// The JSON-RPC surface the pipeline needs from a ledger node.
///
/// Errors keep the node's message text; revert classification happens in
/// [`crate::blockchain::transaction`].
#[async_trait]
pub trait LedgerNode: Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> BlockchainResult<u64>;

    /// `eth_blockNumber`
    async fn block_number(&self) -> BlockchainResult<u64>;

    /// Timestamp of the latest block (`eth_getBlockByNumber("latest")`).
    async fn latest_block_timestamp(&self) -> BlockchainResult<u64>;

    /// `eth_getTransactionCount(address, "pending")`
    async fn transaction_count(&self, address: Address) -> BlockchainResult<u64>;

    /// `eth_gasPrice`, in wei.
    async fn gas_price(&self) -> BlockchainResult<u128>;

    /// `eth_call` against the latest block.
    async fn call(&self, tx: &TransactionRequest) -> BlockchainResult<Bytes>;

    /// `eth_estimateGas`
    async fn estimate_gas(&self, tx: &TransactionRequest) -> BlockchainResult<u64>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash>;

    /// `eth_getTransactionReceipt`; `None` while the transaction is pending.
    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<ReceiptView>>;
}
