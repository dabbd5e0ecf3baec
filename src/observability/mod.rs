//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via `metrics`)
//!
//! Consumers:
//!     → stderr (log lines)
//!     → whatever recorder the binary installs
//! ```
//!
//! # Design Decisions
//! - Structured fields (`task_id`, `key`, `tx_hash`, `stage`) on every event
//! - Metrics are cheap; without a recorder they are no-ops

pub mod logging;
pub mod metrics;
