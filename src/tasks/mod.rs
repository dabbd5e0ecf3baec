//! Remote asynchronous job orchestration.
//!
//! # Data Flow
//! ```text
//! JobRequest
//!     → service.rs (JobService::submit → TaskHandle)
//!     → poller.rs (status polling, deadline checks between polls)
//!     → poller.rs resolve_outcome (result endpoint, then status-embedded result)
//!     → TaskOutcome (the single shape every stage consumes)
//! ```
//!
//! # Design Decisions
//! - Submissions are never retried; status/result reads are (http.rs)
//! - A timeout is not a failure: the last non-ready status is returned
//! - Transport errors inside the poll loop become synthetic FAILURE statuses

pub mod http;
pub mod poller;
pub mod service;
pub mod types;

pub use http::HttpJobService;
pub use poller::{TaskPoller, TaskRun};
pub use service::{strip_nulls, JobKind, JobRequest, JobService, TaskError};
pub use types::{TaskHandle, TaskOutcome, TaskResultPayload, TaskState, TaskStatus, WaitManyResult};
