//! Retry logic.
//!
//! # Responsibilities
//! - Re-run idempotent job-service reads on transport failures
//! - Space attempts with exponential backoff + jitter
//!
//! # Design Decisions
//! - Never retry submissions (job submit, raw transaction broadcast)
//! - The caller decides which errors are retryable

use std::future::Future;

use crate::config::RetryConfig;
use crate::resilience::backoff::retry_delay;

/// Run `op` until it succeeds, returns a non-retryable error, or attempts run out.
pub async fn retry_async<T, E, F, Fut>(
    config: &RetryConfig,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = if config.enabled { config.max_attempts.max(1) } else { 1 };
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = retry_delay(config, attempt);
                tracing::debug!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
