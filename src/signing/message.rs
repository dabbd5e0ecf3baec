//! Canonical message encoding and hashing.
//!
//! A verifying contract recomputes `keccak256(abi.encode(...))` over a fixed
//! tuple and recovers the signer from its personal-sign digest. The field
//! order and types here must match that tuple exactly; a mismatch yields a
//! valid-looking hash that the verifier rejects.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{eip191_hash_message, keccak256, Address, B256, U256};

use crate::signing::SigningError;

/// One typed value of an ordered message tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Str(String),
    Bytes32(B256),
    Address(Address),
    Uint(U256),
}

impl Field {
    pub fn str(s: impl Into<String>) -> Self {
        Field::Str(s.into())
    }

    /// Parse a 32-byte value; any other length is rejected rather than padded.
    pub fn bytes32_hex(hex: &str) -> Result<Self, SigningError> {
        let bytes = decode_hex(hex, "bytes32")?;
        if bytes.len() != 32 {
            return Err(SigningError::WrongLength {
                what: "bytes32",
                expected: 32,
                actual: bytes.len(),
            });
        }
        Ok(Field::Bytes32(B256::from_slice(&bytes)))
    }

    pub fn address_hex(hex: &str) -> Result<Self, SigningError> {
        let bytes = decode_hex(hex, "address")?;
        if bytes.len() != 20 {
            return Err(SigningError::WrongLength {
                what: "address",
                expected: 20,
                actual: bytes.len(),
            });
        }
        Ok(Field::Address(Address::from_slice(&bytes)))
    }

    pub fn uint(n: impl Into<U256>) -> Self {
        Field::Uint(n.into())
    }

    fn to_sol(&self) -> DynSolValue {
        match self {
            Field::Str(s) => DynSolValue::String(s.clone()),
            Field::Bytes32(b) => DynSolValue::FixedBytes(*b, 32),
            Field::Address(a) => DynSolValue::Address(*a),
            Field::Uint(n) => DynSolValue::Uint(*n, 256),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Field::Str(_) => "string",
            Field::Bytes32(_) => "bytes32",
            Field::Address(_) => "address",
            Field::Uint(_) => "uint256",
        }
    }
}

/// An explicit, ordered tuple of typed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedFields(Vec<Field>);

impl OrderedFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field) -> Self {
        self.0.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.0
    }

    /// Solidity type signature, e.g. `(string,bytes32,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.0.iter().map(Field::type_name).collect();
        format!("({})", types.join(","))
    }

    /// `abi.encode(f0, f1, ...)`.
    pub fn abi_encode(&self) -> Vec<u8> {
        DynSolValue::Tuple(self.0.iter().map(Field::to_sol).collect()).abi_encode_params()
    }
}

impl FromIterator<Field> for OrderedFields {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `keccak256(abi.encode(fields...))`.
pub fn build_message_hash(fields: &OrderedFields) -> B256 {
    keccak256(fields.abi_encode())
}

/// `keccak256("\x19Ethereum Signed Message:\n32" ‖ hash)`, the digest that
/// `ECDSA.toEthSignedMessageHash(bytes32)` produces on-chain.
pub fn wrap_for_personal_sign(hash: B256) -> B256 {
    eip191_hash_message(hash.as_slice())
}

/// Prefix that the dataset registry puts first in its signed tuple.
pub const REGISTER_DATASET_PREFIX: &str = "Register dataset:";

/// The dataset registration tuple:
/// `("Register dataset:", uri, suiteHash, fileFormat, reportUri, uploader, nonce)`
/// typed `(string, string, bytes32, string, string, address, uint256)`.
pub fn register_dataset_fields(
    uri: &str,
    suite_hash: &str,
    file_format: &str,
    report_uri: &str,
    uploader: Address,
    nonce: U256,
) -> Result<OrderedFields, SigningError> {
    Ok(OrderedFields::new()
        .with(Field::str(REGISTER_DATASET_PREFIX))
        .with(Field::str(uri))
        .with(Field::bytes32_hex(suite_hash)?)
        .with(Field::str(file_format))
        .with(Field::str(report_uri))
        .with(Field::Address(uploader))
        .with(Field::Uint(nonce)))
}

fn decode_hex(hex: &str, what: &'static str) -> Result<Vec<u8>, SigningError> {
    let trimmed = hex.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    alloy::hex::decode(digits).map_err(|e| SigningError::InvalidHex {
        what,
        reason: e.to_string(),
    })
}
