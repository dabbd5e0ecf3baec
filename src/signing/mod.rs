//! Hash and signature building for on-chain verifiers.
//!
//! # Data Flow
//! ```text
//! OrderedFields (explicit types, explicit order)
//!     → message.rs build_message_hash (abi.encode + keccak256)
//!     → message.rs wrap_for_personal_sign (EIP-191 prefix)
//!     → Wallet::sign_personal | externally supplied hex
//!     → signature.rs normalize_signature (65 bytes, v ∈ {27, 28})
//! ```
//!
//! # Design Decisions
//! - Fixed-size fields are length-checked before encoding, never padded
//! - Local and external signatures leave through the same normalizer
//! - Nonces are never cached here; callers read them from the ledger right
//!   before building the hash

use thiserror::Error;

pub mod message;
pub mod signature;

pub use message::{
    build_message_hash, register_dataset_fields, wrap_for_personal_sign, Field, OrderedFields,
};
pub use signature::{normalize_signature, normalize_signature_bytes, Bytes65};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signature is empty")]
    EmptySignature,

    #[error("invalid hex for {what}: {reason}")]
    InvalidHex { what: &'static str, reason: String },

    #[error("{what} must be {expected} bytes, got {actual}")]
    WrongLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("signer failed: {0}")]
    Signer(String),
}
