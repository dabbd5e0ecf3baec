//! Attestation pipeline: commit off-chain data-quality claims to a ledger.
//!
//! Remote prepare jobs compute the values to commit, every stage persists its
//! request and response to an artifact store, and submit stages read those
//! artifacts back, sign, and send the contract call.

pub mod artifacts;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod signing;
pub mod tasks;

pub use config::AttestConfig;
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOptions, StageOutput};
