//! Local signing key.
//!
//! # Security
//! - The key is handed in by the caller; this module never reads the
//!   process environment
//! - Keys are never logged or serialized

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;

use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::signing::{normalize_signature_bytes, Bytes65};

/// Signs attestation digests and transactions for one account.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key (with or without `0x`).
    pub fn from_private_key(private_key_hex: &str) -> BlockchainResult<Self> {
        let trimmed = private_key_hex.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "Wallet initialized");
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign `hash` the way `ECDSA.recover(toEthSignedMessageHash(hash), sig)`
    /// expects: EIP-191 prefix over the 32 raw bytes, `v ∈ {27, 28}`.
    pub async fn sign_personal(&self, hash: B256) -> BlockchainResult<Bytes65> {
        let signature = self
            .signer
            .sign_message(hash.as_slice())
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Message signing failed: {}", e)))?;
        Ok(normalize_signature_bytes(&signature.as_bytes())?)
    }

    /// Sign a fully populated transaction request, returning the EIP-2718
    /// encoding ready for `eth_sendRawTransaction`.
    pub async fn sign_transaction(&self, tx: TransactionRequest) -> BlockchainResult<Bytes> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let envelope = tx
            .build(&wallet)
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Transaction signing failed: {}", e)))?;
        Ok(Bytes::from(envelope.encoded_2718()))
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address()).finish()
    }
}
