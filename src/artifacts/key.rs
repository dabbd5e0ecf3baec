//! Sanitized hierarchical keys.

use std::fmt;

use crate::artifacts::store::{StoreError, StoreResult};

/// A slash-delimited store key with no empty or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Normalize and validate a raw key.
    ///
    /// Backslashes become slashes, surrounding slashes and whitespace are trimmed,
    /// repeated slashes collapse. Empty keys and `..` segments are rejected.
    pub fn new(raw: &str) -> StoreResult<Self> {
        let unified = raw.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in unified.trim().split('/') {
            let segment = segment.trim();
            if segment.is_empty() || segment == "." {
                continue;
            }
            if segment == ".." {
                return Err(StoreError::InvalidKey(raw.to_string()));
            }
            segments.push(segment);
        }
        if segments.is_empty() {
            return Err(StoreError::InvalidKey(raw.to_string()));
        }
        Ok(Self(segments.join("/")))
    }

    /// Append one or more segments.
    pub fn join(&self, suffix: &str) -> StoreResult<Self> {
        let suffix_key = Self::new(suffix)?;
        Ok(Self(format!("{}/{}", self.0, suffix_key.0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
