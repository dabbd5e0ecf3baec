//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AttestConfig (validated, immutable)
//!     → passed by reference into every constructor
//!
//! environment (binary only)
//!     → Secrets (signing key, backend token, RPC override)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the library never reads process environment
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AttestConfig, ContractsConfig, JobEndpoints, JobServiceConfig, LedgerConfig, NetworkConfig,
    ObservabilityConfig, PollingConfig, RetryConfig, Secrets, StorageConfig,
};
