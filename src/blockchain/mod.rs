//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! registry.rs (network, name) → address + ABI from the local cache
//!     → transaction.rs ContractCall (function by name/arity, typed args)
//!     → transaction.rs ChainSubmitter::estimate (revert → ChainRevert)
//!     → wallet.rs (sign) → node.rs LedgerNode (broadcast, receipt polling)
//!     → receipt.rs (identifier extraction from logs)
//! ```
//!
//! # Security Constraints
//! - The signing key is passed in explicitly; nothing here reads the environment
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod node;
pub mod receipt;
pub mod registry;
pub mod revert;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::BlockchainClient;
pub use node::LedgerNode;
pub use receipt::{extract_identifier, extract_indexed_topic, EventField, Extracted, Strategy};
pub use registry::{ContractRegistry, ContractSummary, ResolvedContract};
pub use revert::{revert_hint, revert_reason};
pub use transaction::{call_view, ether_to_wei, ChainSubmitter, ContractCall, FeeOverrides};
pub use types::{BlockchainError, BlockchainResult, LogView, ReceiptView, TransactionResult};
pub use wallet::Wallet;
