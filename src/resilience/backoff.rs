//! Delay between retries of an idempotent job-service read.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped
/// at `max_delay_ms`, plus up to 10% jitter.
pub fn retry_delay(config: &RetryConfig, retry: u32) -> Duration {
    let Some(exponent) = retry.checked_sub(1) else {
        return Duration::ZERO;
    };
    let capped = config
        .base_delay_ms
        .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX))
        .min(config.max_delay_ms);

    let spread = capped / 10;
    let jitter = if spread == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..spread)
    };
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retries(base_delay_ms: u64, max_delay_ms: u64) -> RetryConfig {
        RetryConfig {
            base_delay_ms,
            max_delay_ms,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let config = retries(100, 1000);
        let first = retry_delay(&config, 1).as_millis();
        assert!((100..110).contains(&first));
        let third = retry_delay(&config, 3).as_millis();
        assert!((400..440).contains(&third));
        let capped = retry_delay(&config, 40).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[test]
    fn test_zeroth_retry_is_immediate() {
        assert_eq!(retry_delay(&retries(100, 1000), 0), Duration::ZERO);
    }
}
