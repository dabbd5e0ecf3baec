//! Metrics collection.
//!
//! # Metrics
//! - `attest_task_polls_total` (counter): status polls by resulting state
//! - `attest_task_wait_seconds` (histogram): time spent waiting on a job
//! - `attest_stage_total` (counter): stage executions by stage, ok
//! - `attest_tx_submitted_total` (counter): submissions by outcome
//! - `attest_artifact_writes_total` (counter): artifact store writes
//!
//! # Design Decisions
//! - Records through the `metrics` facade only; installing an exporter is the
//!   embedding application's choice
//! - Label values are low-cardinality (no task ids, no hashes)

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn recording on or off process-wide (`observability.metrics_enabled`).
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

fn enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn record_task_poll(state: &str) {
    if !enabled() {
        return;
    }
    metrics::counter!("attest_task_polls_total", "state" => state.to_string()).increment(1);
}

pub fn record_task_wait(elapsed: Duration) {
    if !enabled() {
        return;
    }
    metrics::histogram!("attest_task_wait_seconds").record(elapsed.as_secs_f64());
}

pub fn record_stage(stage: &'static str, ok: bool) {
    if !enabled() {
        return;
    }
    metrics::counter!(
        "attest_stage_total",
        "stage" => stage,
        "ok" => if ok { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_tx_submission(outcome: &'static str) {
    if !enabled() {
        return;
    }
    metrics::counter!("attest_tx_submitted_total", "outcome" => outcome).increment(1);
}

pub fn record_artifact_write() {
    if !enabled() {
        return;
    }
    metrics::counter!("attest_artifact_writes_total").increment(1);
}
