//! Contract calls: encoding, gas estimation, signing, broadcast and
//! confirmation monitoring.
//!
//! # Responsibilities
//! - Select an ABI function by name and arity and type-check its arguments
//! - Dry-run the call; classify reverts with their decoded reason
//! - Build the transaction with gas headroom and the configured fee policy
//! - Sign with the local key, broadcast, and wait for the receipt

use std::time::Duration;

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::Function;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use serde_json::Value;
use tokio::time::{sleep, Instant};

use crate::blockchain::node::LedgerNode;
use crate::blockchain::registry::ResolvedContract;
use crate::blockchain::revert::revert_reason;
use crate::blockchain::types::{BlockchainError, BlockchainResult, ReceiptView, TransactionResult};
use crate::blockchain::wallet::Wallet;
use crate::config::LedgerConfig;
use crate::error::PipelineError;
use crate::observability::metrics;

const WEI_PER_GWEI: f64 = 1_000_000_000.0;
const DEFAULT_PRIORITY_FEE_WEI: u128 = 1_000_000_000;

/// A fully encoded call to one contract function.
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub to: Address,
    pub function: Function,
    pub args: Vec<DynSolValue>,
    pub value: U256,
}

impl ContractCall {
    /// Select `name` from the contract ABI by arity and check argument types.
    pub fn new(contract: &ResolvedContract, name: &str, args: Vec<DynSolValue>) -> BlockchainResult<Self> {
        let function = select_function(contract, name, args.len())?;

        for (param, arg) in function.inputs.iter().zip(&args) {
            let ty = param
                .resolve()
                .map_err(|e| BlockchainError::Abi(format!("{}.{}: {}", name, param.name, e)))?;
            if !ty.matches(arg) {
                return Err(BlockchainError::Abi(format!(
                    "argument '{}' of {} expects {}, got {:?}",
                    param.name,
                    name,
                    param.ty,
                    arg.sol_type_name()
                )));
            }
        }

        Ok(Self {
            to: contract.address,
            function,
            args,
            value: U256::ZERO,
        })
    }

    /// Like [`ContractCall::new`], but with loosely typed JSON arguments as
    /// they come out of persisted artifacts. Each one is coerced to the ABI
    /// input type: hex text for bytes and addresses, decimal text or numbers
    /// for integers.
    pub fn from_json(contract: &ResolvedContract, name: &str, args: &[Value]) -> BlockchainResult<Self> {
        let function = select_function(contract, name, args.len())?;
        let values = function
            .inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty = param
                    .resolve()
                    .map_err(|e| BlockchainError::Abi(format!("{}.{}: {}", name, param.name, e)))?;
                coerce_json(&ty, arg).map_err(|reason| {
                    BlockchainError::Abi(format!("argument '{}' of {}: {}", param.name, name, reason))
                })
            })
            .collect::<BlockchainResult<Vec<_>>>()?;
        Self::new(contract, name, values)
    }

    /// Attach native value (e.g. a bounty) to the call.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn calldata(&self) -> BlockchainResult<Bytes> {
        self.function
            .abi_encode_input(&self.args)
            .map(Bytes::from)
            .map_err(|e| BlockchainError::Abi(format!("encoding {}: {}", self.function.name, e)))
    }

    /// Transaction request without gas or fee fields.
    pub fn request(&self, from: Address) -> BlockchainResult<TransactionRequest> {
        Ok(TransactionRequest::default()
            .with_from(from)
            .with_to(self.to)
            .with_value(self.value)
            .with_input(self.calldata()?))
    }

    pub fn decode_output(&self, data: &[u8]) -> BlockchainResult<Vec<DynSolValue>> {
        self.function
            .abi_decode_output(data)
            .map_err(|e| BlockchainError::Abi(format!("decoding {} output: {}", self.function.name, e)))
    }
}

/// Optional EIP-1559 fee caps, in gwei.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeOverrides {
    pub max_fee_gwei: Option<f64>,
    pub max_priority_fee_gwei: Option<f64>,
}

impl FeeOverrides {
    fn is_eip1559(&self) -> bool {
        self.max_fee_gwei.is_some() || self.max_priority_fee_gwei.is_some()
    }
}

/// Read-only call helper; needs no signing key.
pub async fn call_view<L: LedgerNode + ?Sized>(
    node: &L,
    call: &ContractCall,
    from: Address,
) -> BlockchainResult<Vec<DynSolValue>> {
    let output = node.call(&call.request(from)?).await?;
    call.decode_output(&output)
}

/// Signs and submits contract calls for one account.
pub struct ChainSubmitter<'a, L: LedgerNode + ?Sized> {
    node: &'a L,
    wallet: &'a Wallet,
    policy: &'a LedgerConfig,
}

impl<'a, L: LedgerNode + ?Sized> ChainSubmitter<'a, L> {
    pub fn new(node: &'a L, wallet: &'a Wallet, policy: &'a LedgerConfig) -> Self {
        Self { node, wallet, policy }
    }

    pub fn sender(&self) -> Address {
        self.wallet.address()
    }

    /// Dry-run `call`; a revert becomes `ChainRevert` at stage `estimate_gas`.
    pub async fn estimate(&self, call: &ContractCall) -> Result<u64, PipelineError> {
        let request = call.request(self.sender())?;
        match self.node.estimate_gas(&request).await {
            Ok(gas) => {
                tracing::debug!(function = call.name(), gas, "Gas estimated");
                Ok(gas)
            }
            Err(e) if e.is_revert() => {
                let reason = match &e {
                    BlockchainError::Rpc(text) => revert_reason(text),
                    other => revert_reason(&other.to_string()),
                };
                tracing::warn!(function = call.name(), reason = %reason, "Gas estimation reverted");
                metrics::record_tx_submission("reverted");
                Err(PipelineError::ChainRevert {
                    reason,
                    stage: "estimate_gas".to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Estimate, then sign, broadcast and confirm.
    pub async fn submit(&self, call: &ContractCall, fees: &FeeOverrides) -> Result<TransactionResult, PipelineError> {
        let gas_estimate = self.estimate(call).await?;
        self.submit_estimated(call, gas_estimate, fees).await
    }

    /// Sign, broadcast and confirm a call whose estimate is already known.
    pub async fn submit_estimated(
        &self,
        call: &ContractCall,
        gas_estimate: u64,
        fees: &FeeOverrides,
    ) -> Result<TransactionResult, PipelineError> {
        let sender = self.sender();
        let nonce = self.node.transaction_count(sender).await?;
        let chain_id = self.node.chain_id().await?;
        let gas_limit = (gas_estimate as f64 * self.policy.gas_limit_multiplier).ceil() as u64;

        let mut tx = call
            .request(sender)?
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(gas_limit);
        tx = self.apply_fees(tx, fees).await?;

        let raw = self.wallet.sign_transaction(tx).await?;
        let tx_hash = self.node.send_raw_transaction(&raw).await?;
        tracing::info!(
            function = call.name(),
            tx_hash = %tx_hash,
            nonce,
            gas_limit,
            "Transaction broadcast"
        );

        // From here on the transaction is out; failures must keep its hash.
        let receipt = self
            .wait_for_receipt(tx_hash)
            .await
            .map_err(|e| PipelineError::broadcast(tx_hash, e.into()))?;
        if !receipt.status {
            metrics::record_tx_submission("reverted");
            let revert = PipelineError::ChainRevert {
                reason: format!("transaction {} reverted", tx_hash),
                stage: "receipt".to_string(),
            };
            return Err(PipelineError::broadcast(tx_hash, revert));
        }

        metrics::record_tx_submission("confirmed");
        Ok(TransactionResult {
            tx_hash,
            gas_estimate,
            receipt,
        })
    }

    async fn apply_fees(&self, tx: TransactionRequest, fees: &FeeOverrides) -> BlockchainResult<TransactionRequest> {
        if fees.is_eip1559() {
            let priority = fees.max_priority_fee_gwei.map(gwei_to_wei);
            let max_fee = match fees.max_fee_gwei {
                Some(gwei) => gwei_to_wei(gwei),
                None => self.node.gas_price().await? + priority.unwrap_or(DEFAULT_PRIORITY_FEE_WEI),
            };
            let priority = priority.unwrap_or(DEFAULT_PRIORITY_FEE_WEI).min(max_fee);
            return Ok(tx
                .with_max_fee_per_gas(max_fee)
                .with_max_priority_fee_per_gas(priority));
        }

        let gas_price = self.node.gas_price().await?;
        let gas_price_gwei = gas_price / WEI_PER_GWEI as u128;
        if gas_price_gwei > self.policy.max_gas_price_gwei as u128 {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: self.policy.max_gas_price_gwei,
            });
        }
        let adjusted = (gas_price as f64 * self.policy.gas_price_multiplier) as u128;
        Ok(tx.with_gas_price(adjusted))
    }

    /// Poll for the receipt until it is `confirmation_blocks` deep. Node
    /// errors while polling are retried until the deadline.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> BlockchainResult<ReceiptView> {
        let timeout = self.policy.receipt_timeout();
        let interval = self.policy.receipt_poll_interval().max(Duration::from_millis(10));
        let required = u64::from(self.policy.confirmation_blocks.max(1));
        let deadline = Instant::now() + timeout;

        loop {
            match self.poll_receipt(tx_hash, required).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt poll failed, retrying"),
            }

            if Instant::now() >= deadline {
                metrics::record_tx_submission("unconfirmed");
                return Err(BlockchainError::ConfirmationTimeout {
                    tx_hash,
                    waited_secs: timeout.as_secs(),
                });
            }
            sleep(interval).await;
        }
    }

    /// One receipt poll: the receipt once it is final, `None` while pending.
    async fn poll_receipt(&self, tx_hash: TxHash, required: u64) -> BlockchainResult<Option<ReceiptView>> {
        let Some(receipt) = self.node.transaction_receipt(tx_hash).await? else {
            tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
            return Ok(None);
        };
        if !receipt.status {
            return Ok(Some(receipt));
        }
        let current = self.node.block_number().await?;
        let mined_at = receipt.block_number.unwrap_or(current);
        let confirmations = current.saturating_sub(mined_at) + 1;
        if confirmations >= required {
            return Ok(Some(receipt));
        }
        tracing::debug!(
            tx_hash = %tx_hash,
            confirmations,
            required,
            "Waiting for confirmations"
        );
        Ok(None)
    }
}

fn select_function(contract: &ResolvedContract, name: &str, arity: usize) -> BlockchainResult<Function> {
    let overloads = contract
        .abi
        .function(name)
        .ok_or_else(|| BlockchainError::Abi(format!("{} has no function '{}'", contract.name, name)))?;
    overloads
        .iter()
        .find(|f| f.inputs.len() == arity)
        .cloned()
        .ok_or_else(|| {
            BlockchainError::Abi(format!(
                "{}.{} has no overload taking {} arguments",
                contract.name, name, arity
            ))
        })
}

fn coerce_json(ty: &DynSolType, arg: &Value) -> Result<DynSolValue, String> {
    match (ty, arg) {
        (DynSolType::String, Value::String(text)) => Ok(DynSolValue::String(text.clone())),
        (DynSolType::Bool, Value::Bool(flag)) => Ok(DynSolValue::Bool(*flag)),
        (_, Value::String(text)) => ty.coerce_str(text.trim()).map_err(|e| e.to_string()),
        (_, Value::Number(n)) => ty.coerce_str(&n.to_string()).map_err(|e| e.to_string()),
        (_, Value::Bool(flag)) => ty.coerce_str(&flag.to_string()).map_err(|e| e.to_string()),
        (_, other) => Err(format!("cannot use {} as {}", other, ty)),
    }
}

fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei.max(0.0) * WEI_PER_GWEI).round() as u128
}

/// Ether amount to wei.
pub fn ether_to_wei(ether: f64) -> U256 {
    U256::from(gwei_to_wei(ether * WEI_PER_GWEI))
}
