//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Idempotent read against the job service:
//!     → retries.rs (check if retryable, retry with backoff)
//!     → backoff.rs (capped exponential delay with jitter)
//! ```
//!
//! Submissions are never routed through here: a retried job submit or
//! transaction broadcast could act twice.

pub mod backoff;
pub mod retries;

pub use retries::retry_async;
