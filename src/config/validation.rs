//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (default network has an RPC entry)
//! - Validate value ranges (timeouts > 0, multipliers >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AttestConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::AttestConfig;

/// A single semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AttestConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if url::Url::parse(&config.job_service.base_url).is_err() {
        errors.push(ValidationError::new(
            "job_service.base_url",
            format!("not a valid URL: '{}'", config.job_service.base_url),
        ));
    }
    if config.job_service.timeout_secs == 0 {
        errors.push(ValidationError::new("job_service.timeout_secs", "must be > 0"));
    }

    let ledger = &config.ledger;
    if !ledger.networks.contains_key(&ledger.network) {
        errors.push(ValidationError::new(
            "ledger.network",
            format!("default network '{}' has no [ledger.networks] entry", ledger.network),
        ));
    }
    for (name, net) in &ledger.networks {
        if url::Url::parse(&net.rpc_url).is_err() {
            errors.push(ValidationError::new(
                format!("ledger.networks.{}.rpc_url", name),
                format!("not a valid URL: '{}'", net.rpc_url),
            ));
        }
    }
    if ledger.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("ledger.rpc_timeout_secs", "must be > 0"));
    }
    if ledger.receipt_poll_interval_ms == 0 {
        errors.push(ValidationError::new("ledger.receipt_poll_interval_ms", "must be > 0"));
    }
    if ledger.gas_limit_multiplier < 1.0 {
        errors.push(ValidationError::new("ledger.gas_limit_multiplier", "must be >= 1.0"));
    }
    if ledger.gas_price_multiplier < 1.0 {
        errors.push(ValidationError::new("ledger.gas_price_multiplier", "must be >= 1.0"));
    }

    if config.storage.root.trim().is_empty() {
        errors.push(ValidationError::new("storage.root", "must not be empty"));
    }

    if config.polling.interval_secs <= 0.0 {
        errors.push(ValidationError::new("polling.interval_secs", "must be > 0"));
    }
    if config.polling.timeout_secs < 0.0 {
        errors.push(ValidationError::new("polling.timeout_secs", "must be >= 0"));
    }

    if config.retries.enabled && config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1 when retries are enabled"));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new("retries.base_delay_ms", "must not exceed retries.max_delay_ms"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
