//! Signature normalization.

use std::fmt;

use alloy::primitives::Bytes;

use crate::signing::SigningError;

/// A 65-byte `r ‖ s ‖ v` signature with `v ∈ {27, 28}` whenever the input
/// used the `{0, 1}` recovery-id form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bytes65([u8; 65]);

impl Bytes65 {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", alloy::hex::encode(self.0))
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }
}

impl fmt::Debug for Bytes65 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bytes65({})", self.to_hex())
    }
}

impl fmt::Display for Bytes65 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Normalize a hex signature for an on-chain `ECDSA.recover`.
///
/// Accepts an optional `0x`, left-pads odd-length hex with a zero, and remaps
/// a trailing recovery byte of 0/1 to 27/28. Anything that does not decode to
/// exactly 65 bytes is rejected.
pub fn normalize_signature(sig: &str) -> Result<Bytes65, SigningError> {
    let trimmed = sig.trim();
    if trimmed.is_empty() {
        return Err(SigningError::EmptySignature);
    }
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let padded;
    let digits = if digits.len() % 2 == 1 {
        padded = format!("0{}", digits);
        padded.as_str()
    } else {
        digits
    };
    let bytes = alloy::hex::decode(digits).map_err(|e| SigningError::InvalidHex {
        what: "signature",
        reason: e.to_string(),
    })?;
    normalize_signature_bytes(&bytes)
}

/// Byte-level form of [`normalize_signature`].
pub fn normalize_signature_bytes(bytes: &[u8]) -> Result<Bytes65, SigningError> {
    let mut out: [u8; 65] = bytes.try_into().map_err(|_| SigningError::WrongLength {
        what: "signature",
        expected: 65,
        actual: bytes.len(),
    })?;
    if out[64] <= 1 {
        out[64] += 27;
    }
    Ok(Bytes65(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_byte_remapped() {
        let sig = format!("0x{}00", "aa".repeat(64));
        let norm = normalize_signature(&sig).unwrap();
        assert_eq!(&norm.as_bytes()[..64], &[0xaa; 64]);
        assert_eq!(norm.v(), 0x1b);

        let norm = normalize_signature(&format!("{}01", "aa".repeat(64))).unwrap();
        assert_eq!(norm.v(), 28);
    }

    #[test]
    fn test_existing_v_untouched() {
        let norm = normalize_signature(&format!("0x{}", "aa".repeat(65))).unwrap();
        assert_eq!(norm.v(), 0xaa);
        let norm = normalize_signature(&format!("0X{}1c", "bb".repeat(64))).unwrap();
        assert_eq!(norm.v(), 28);
    }

    #[test]
    fn test_idempotent() {
        for sig in [
            format!("0x{}00", "aa".repeat(64)),
            format!("{}1b", "12".repeat(64)),
            format!("0x{}", "ff".repeat(65)),
        ] {
            let once = normalize_signature(&sig).unwrap();
            let twice = normalize_signature(&once.to_hex()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_odd_length_left_padded() {
        // 129 hex digits: a leading zero nibble was dropped by the producer.
        let sig = format!("a{}", "bb".repeat(64));
        let norm = normalize_signature(&sig).unwrap();
        assert_eq!(norm.as_bytes()[0], 0x0a);
        assert_eq!(norm.v(), 0xbb);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            normalize_signature(&"aa".repeat(64)),
            Err(SigningError::WrongLength { actual: 64, .. })
        ));
        assert!(normalize_signature(&"aa".repeat(66)).is_err());
        assert!(matches!(normalize_signature("  "), Err(SigningError::EmptySignature)));
        assert!(normalize_signature("0xnothex").is_err());
    }
}
