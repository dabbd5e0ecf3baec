//! Ledger RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to the JSON-RPC endpoints of one configured network
//! - Apply a per-call timeout and move on to the next endpoint on transport
//!   failure or timeout
//! - Return node-reported errors (reverts included) immediately, since every
//!   endpoint would answer the same

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::{RpcError, TransportResult};
use async_trait::async_trait;
use tokio::time::timeout;

use crate::blockchain::node::LedgerNode;
use crate::blockchain::types::{BlockchainError, BlockchainResult, ReceiptView};
use crate::config::{LedgerConfig, NetworkConfig};

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Ledger RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    network: String,
    /// Primary provider first, then failovers.
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Connect to `network` as configured in `ledger`.
    ///
    /// `rpc_override` replaces the configured primary URL. When the network
    /// pins a chain id it is checked; an unreachable node only logs a warning
    /// so offline stages (and tests) can still build a client.
    pub async fn connect(
        ledger: &LedgerConfig,
        network: &str,
        rpc_override: Option<&str>,
    ) -> BlockchainResult<Self> {
        let fallback;
        let net: &NetworkConfig = match ledger.networks.get(network) {
            Some(net) => net,
            None if rpc_override.is_some() => {
                fallback = NetworkConfig::default();
                &fallback
            }
            None => return Err(BlockchainError::UnknownNetwork(network.to_string())),
        };

        let primary = rpc_override.unwrap_or(&net.rpc_url).to_string();
        let primary_url: url::Url = primary
            .parse()
            .map_err(|e| BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", primary, e)))?;

        let mut providers: Vec<DynProvider> =
            vec![Arc::new(ProviderBuilder::new().connect_http(primary_url))];
        let mut urls = vec![primary.clone()];

        for url_str in &net.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => {
                    providers.push(Arc::new(ProviderBuilder::new().connect_http(url)));
                    urls.push(url_str.clone());
                }
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            network: network.to_string(),
            providers,
            urls,
            timeout_duration: Duration::from_secs(ledger.rpc_timeout_secs.max(1)),
        };

        if let Some(expected) = net.chain_id {
            match client.chain_id().await {
                Ok(actual) if actual != expected => {
                    return Err(BlockchainError::ChainMismatch { expected, actual });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    network = %network,
                    error = %e,
                    "Ledger client initialized but chain verification failed"
                ),
            }
        }

        tracing::info!(network = %network, rpc_url = %primary, "Ledger client initialized");
        Ok(client)
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Run `op` against each provider in turn until one answers.
    async fn with_failover<T, F, Fut>(&self, method: &'static str, op: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut last_error = None;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(RpcError::ErrorResp(payload))) => {
                    tracing::debug!(method, code = payload.code, message = %payload.message, "Node returned an error");
                    return Err(BlockchainError::Rpc(payload.message.to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!(method, provider_idx = i, error = %e, "RPC error, trying next provider");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    tracing::warn!(method, provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        match last_error {
            Some(e) => Err(BlockchainError::Rpc(format!(
                "All RPC providers failed for {}: {}",
                method, e
            ))),
            None => Err(BlockchainError::Timeout(self.timeout_duration.as_secs())),
        }
    }
}

#[async_trait]
impl LedgerNode for BlockchainClient {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        self.with_failover("eth_chainId", |p| async move { p.get_chain_id().await })
            .await
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn latest_block_timestamp(&self) -> BlockchainResult<u64> {
        let block = self
            .with_failover("eth_getBlockByNumber", |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Latest).await
            })
            .await?;
        block
            .map(|b| b.header.timestamp)
            .ok_or_else(|| BlockchainError::Rpc("latest block not available".to_string()))
    }

    async fn transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        self.with_failover("eth_getTransactionCount", move |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        self.with_failover("eth_gasPrice", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn call(&self, tx: &TransactionRequest) -> BlockchainResult<Bytes> {
        self.with_failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(tx).await }
        })
        .await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> BlockchainResult<u64> {
        self.with_failover("eth_estimateGas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(tx).await }
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        self.with_failover("eth_sendRawTransaction", |p| {
            let raw = raw.to_vec();
            async move {
                p.send_raw_transaction(&raw)
                    .await
                    .map(|pending| *pending.tx_hash())
            }
        })
        .await
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<ReceiptView>> {
        let receipt = self
            .with_failover("eth_getTransactionReceipt", move |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;
        match receipt {
            Some(r) => {
                let raw = serde_json::to_value(&r)
                    .map_err(|e| BlockchainError::Receipt(e.to_string()))?;
                ReceiptView::from_json(raw).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("network", &self.network)
            .field("rpc_urls", &self.urls)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
