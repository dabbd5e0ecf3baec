//! Pipeline-level error taxonomy.
//!
//! Subsystems keep their own error enums; stages convert them into
//! [`PipelineError`], whose [`code`](PipelineError::code) is the stable string
//! emitted in a failed stage's `error.code`.

use alloy::primitives::TxHash;
use thiserror::Error;

use crate::artifacts::StoreError;
use crate::blockchain::revert_hint;
use crate::blockchain::BlockchainError;
use crate::signing::SigningError;
use crate::tasks::TaskError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A remote job reached `FAILURE`.
    #[error("Remote job {task_id} failed: {message}")]
    RemoteJobFailure { task_id: String, message: String },

    /// A remote job was still not ready at the deadline.
    #[error("Remote job {task_id} did not finish before the deadline")]
    Timeout { task_id: String },

    /// A gas estimate, call or mined transaction reverted.
    #[error("{reason}")]
    ChainRevert { reason: String, stage: String },

    /// A predecessor artifact is absent or unusable.
    #[error("Missing artifact at '{key}': {reason}")]
    MissingArtifact { key: String, reason: String },

    /// Required input fields are missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The on-chain deadline has already passed.
    #[error("Deadline in past (deadline={deadline}, chain_now={chain_now})")]
    DeadlinePast { deadline: u64, chain_now: u64 },

    /// Failure after the transaction was broadcast; it may still be mined.
    #[error("{source} (transaction {tx_hash})")]
    Broadcast {
        tx_hash: TxHash,
        source: Box<PipelineError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl PipelineError {
    pub fn missing(key: impl ToString, reason: impl Into<String>) -> Self {
        PipelineError::MissingArtifact {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation(message.into())
    }

    pub fn broadcast(tx_hash: TxHash, source: PipelineError) -> Self {
        PipelineError::Broadcast {
            tx_hash,
            source: Box::new(source),
        }
    }

    /// Hash of a transaction that was already sent when this failure happened.
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            PipelineError::Broadcast { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::RemoteJobFailure { .. } => "REMOTE_JOB_FAILURE",
            PipelineError::Timeout { .. } => "TIMEOUT",
            PipelineError::ChainRevert { .. } => "EVM_REVERT",
            PipelineError::MissingArtifact { .. } => "MISSING_ARTIFACT",
            PipelineError::Validation(_) => "VALIDATION_ERROR",
            PipelineError::DeadlinePast { .. } => "DEADLINE_PAST",
            PipelineError::Broadcast { source, .. } => source.code(),
            PipelineError::Store(_) => "STORAGE_ERROR",
            PipelineError::Signing(_) => "SIGNING_ERROR",
            PipelineError::Chain(BlockchainError::Store(_)) => "STORAGE_ERROR",
            PipelineError::Chain(BlockchainError::Signing(_)) => "SIGNING_ERROR",
            PipelineError::Chain(_) => "CHAIN_ERROR",
            PipelineError::Task(TaskError::Failed { .. }) => "REMOTE_JOB_FAILURE",
            PipelineError::Task(_) => "TRANSPORT_ERROR",
        }
    }

    /// Stage at which the failure happened, when it is known.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::ChainRevert { stage, .. } => Some(stage),
            PipelineError::DeadlinePast { .. } => Some("precheck"),
            PipelineError::Broadcast { source, .. } => source.stage().or(Some("receipt")),
            _ => None,
        }
    }

    /// Operator hint for failures with a known remedy.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PipelineError::ChainRevert { reason, .. } => revert_hint(reason),
            PipelineError::Broadcast { source, .. } => source.hint(),
            _ => None,
        }
    }

    /// Failures that strict mode raises instead of persisting.
    pub fn is_strict_fatal(&self) -> bool {
        match self {
            PipelineError::RemoteJobFailure { .. } | PipelineError::ChainRevert { .. } => true,
            PipelineError::Broadcast { source, .. } => source.is_strict_fatal(),
            _ => false,
        }
    }
}
