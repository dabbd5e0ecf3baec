//! Polling remote jobs to a terminal state.
//!
//! Polling never raises on transport trouble: a status call that fails is
//! recorded as a synthetic `FAILURE` status carrying the error text. Deadlines
//! are checked between polls; nothing in flight is cancelled.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::tasks::service::{JobRequest, JobService, TaskError};
use crate::tasks::types::{TaskHandle, TaskOutcome, TaskState, TaskStatus, WaitManyResult};

/// Result of [`TaskPoller::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub handle: TaskHandle,
    /// Last observed status; `None` when polling was not requested.
    pub status: Option<TaskStatus>,
    pub outcome: TaskOutcome,
}

pub struct TaskPoller<'a, J: JobService + ?Sized> {
    jobs: &'a J,
}

impl<'a, J: JobService + ?Sized> TaskPoller<'a, J> {
    pub fn new(jobs: &'a J) -> Self {
        Self { jobs }
    }

    /// Current status of `task_id`. Transport errors become a `FAILURE` status.
    pub async fn status(&self, task_id: &str) -> TaskStatus {
        let status = match self.jobs.status(task_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(task_id, error = %e, "Status poll failed");
                TaskStatus::synthetic_failure(e.to_string())
            }
        };
        metrics::record_task_poll(status.state.as_str());
        status
    }

    /// Poll every `interval` until the job is ready or `timeout` elapses.
    ///
    /// On timeout the last (non-ready) status is returned; callers must check
    /// `is_ready` rather than assume failure.
    pub async fn wait(&self, task_id: &str, timeout: Duration, interval: Duration) -> TaskStatus {
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let status = self.status(task_id).await;
            if status.is_ready() {
                metrics::record_task_wait(started.elapsed());
                tracing::info!(task_id, state = %status.state, "Task finished");
                return status;
            }
            if Instant::now() >= deadline {
                tracing::warn!(task_id, state = %status.state, "Task still running at deadline");
                return status;
            }
            tracing::debug!(task_id, state = %status.state, "Task not ready");
            tokio::time::sleep(interval).await;
        }
    }

    /// Poll several jobs in rounds until all are ready or `timeout` elapses.
    ///
    /// With `raise_on_failure` the first failed job aborts the wait with
    /// [`TaskError::Failed`]; otherwise failures are collected.
    pub async fn wait_many<I, T>(
        &self,
        task_ids: I,
        timeout: Duration,
        interval: Duration,
        raise_on_failure: bool,
    ) -> Result<WaitManyResult, TaskError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut result = WaitManyResult {
            pending: task_ids
                .into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
            ..WaitManyResult::default()
        };
        let deadline = Instant::now() + timeout;

        while !result.pending.is_empty() {
            let round: Vec<String> = result.pending.iter().cloned().collect();
            for task_id in round {
                let status = self.status(&task_id).await;
                if status.is_ready() {
                    result.pending.remove(&task_id);
                    if status.is_success() {
                        result.succeeded.insert(task_id.clone());
                    } else {
                        result.failed.insert(task_id.clone());
                        if raise_on_failure {
                            return Err(TaskError::Failed {
                                task_id,
                                message: status.failure_message(),
                            });
                        }
                    }
                }
                result.statuses.insert(task_id, status);
            }

            if result.pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        result.timed_out = !result.pending.is_empty();
        if result.timed_out {
            tracing::warn!(pending = result.pending.len(), "Some tasks still pending at deadline");
        }
        Ok(result)
    }

    /// Resolve a status into an outcome.
    ///
    /// On success the result endpoint is consulted first; when it is
    /// unavailable or empty the value embedded in the status is used.
    pub async fn resolve_outcome(&self, task_id: &str, status: &TaskStatus) -> TaskOutcome {
        match &status.state {
            TaskState::Success => {
                let from_result = match self.jobs.result(task_id).await {
                    Ok(payload) if payload.ready && payload.successful != Some(false) && !payload.value.is_null() => {
                        Some(payload.value)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        tracing::debug!(task_id, error = %e, "Result endpoint unavailable, using status result");
                        None
                    }
                };
                let value = from_result
                    .or_else(|| status.result.clone())
                    .unwrap_or(Value::Null);
                TaskOutcome::Succeeded { value }
            }
            TaskState::Failure => TaskOutcome::Failed {
                message: status.failure_message(),
            },
            other => TaskOutcome::Pending { state: other.clone() },
        }
    }

    /// Submit, optionally wait, and resolve.
    pub async fn run(
        &self,
        request: &JobRequest,
        poll: bool,
        timeout: Duration,
        interval: Duration,
    ) -> Result<TaskRun, TaskError> {
        let handle = self.jobs.submit(request).await?;
        if !poll {
            return Ok(TaskRun {
                handle,
                status: None,
                outcome: TaskOutcome::Pending {
                    state: TaskState::Pending,
                },
            });
        }
        let status = self.wait(&handle.task_id, timeout, interval).await;
        let outcome = self.resolve_outcome(&handle.task_id, &status).await;
        Ok(TaskRun {
            handle,
            status: Some(status),
            outcome,
        })
    }

    /// The job's value on success; `None` on failure or timeout.
    pub async fn wait_for_value(&self, task_id: &str, timeout: Duration, interval: Duration) -> Option<Value> {
        let status = self.wait(task_id, timeout, interval).await;
        match self.resolve_outcome(task_id, &status).await {
            TaskOutcome::Succeeded { value } => Some(value),
            _ => None,
        }
    }
}
