//! `reqwest`-backed job service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{JobEndpoints, JobServiceConfig, RetryConfig};
use crate::resilience::retry_async;
use crate::tasks::service::{strip_nulls, JobKind, JobRequest, JobService, TaskError};
use crate::tasks::types::{TaskHandle, TaskResultPayload, TaskStatus};

/// HTTP client for the job service. GETs are retried with backoff; POSTs are not.
#[derive(Clone)]
pub struct HttpJobService {
    client: Client,
    base_url: String,
    endpoints: JobEndpoints,
    token: Option<String>,
    retries: RetryConfig,
}

impl HttpJobService {
    pub fn new(
        config: &JobServiceConfig,
        retries: RetryConfig,
        token: Option<String>,
    ) -> Result<Self, TaskError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TaskError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoints: config.endpoints.clone(),
            token: token.as_deref().and_then(normalize_bearer_token),
            retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn submit_path(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::PrepareSuite => &self.endpoints.prepare_suite,
            JobKind::PrepareReward => &self.endpoints.prepare_reward,
            JobKind::PrepareValidation => &self.endpoints.prepare_validation,
            JobKind::PrepareReport => &self.endpoints.prepare_report,
            JobKind::IngestTx => &self.endpoints.ingest_tx,
        }
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TaskError> {
        self.with_auth(request)
            .send()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, TaskError> {
        let url = self.url(path);
        let url = url.as_str();
        retry_async(&self.retries, TaskError::is_retryable, || async move {
            let response = self.send(self.client.get(url).query(query)).await?;
            decode(response).await
        })
        .await
    }

    async fn status_once(&self, url: &str) -> Result<TaskStatus, TaskError> {
        let response = self.send(self.client.get(url)).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;
        // A failed job is reported as HTTP 500 with a regular status body.
        if let Ok(parsed) = serde_json::from_str::<TaskStatus>(&body) {
            return Ok(parsed);
        }
        if status.is_success() {
            Err(TaskError::Decode(format!("status body is not a task status: {}", truncate(&body))))
        } else {
            Err(TaskError::Http {
                status: status.as_u16(),
                body: truncate(&body),
            })
        }
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn submit(&self, request: &JobRequest) -> Result<TaskHandle, TaskError> {
        let url = self.url(self.submit_path(request.kind));
        let body = strip_nulls(request.payload.clone());
        tracing::debug!(kind = request.kind.as_str(), url = %url, "Submitting job");
        let response = self.send(self.client.post(&url).json(&body)).await?;
        let handle: TaskHandle = decode(response).await?;
        tracing::info!(kind = request.kind.as_str(), task_id = %handle.task_id, "Job submitted");
        Ok(handle)
    }

    async fn status(&self, task_id: &str) -> Result<TaskStatus, TaskError> {
        let url = self.url(&format!("{}/{}", self.endpoints.task_status, task_id));
        let url = url.as_str();
        retry_async(&self.retries, TaskError::is_retryable, move || self.status_once(url)).await
    }

    async fn result(&self, task_id: &str) -> Result<TaskResultPayload, TaskError> {
        self.get_json(&format!("{}/{}", self.endpoints.task_result, task_id), &[])
            .await
    }

    async fn list_contracts(&self, network: &str, page: u32, per_page: u32) -> Result<Value, TaskError> {
        let query = [
            ("network", network.to_string()),
            ("withEventsCount", "1".to_string()),
            ("includeAbi", "0".to_string()),
            ("sort", "id,asc".to_string()),
            ("page", page.to_string()),
            ("perPage", per_page.to_string()),
        ];
        self.get_json(&self.endpoints.contracts, &query).await
    }

    async fn get_contract(&self, address: &str, include_abi: bool) -> Result<Value, TaskError> {
        let query = [
            ("includeAbi", if include_abi { "1" } else { "0" }.to_string()),
            ("withEventsCount", "1".to_string()),
        ];
        self.get_json(&format!("{}/{}", self.endpoints.contracts, address), &query)
            .await
    }
}

impl std::fmt::Debug for HttpJobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJobService")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TaskError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TaskError::Transport(e.to_string()))?;
    if !status.is_success() {
        return Err(TaskError::Http {
            status: status.as_u16(),
            body: truncate(&body),
        });
    }
    serde_json::from_str(&body).map_err(|e| TaskError::Decode(format!("{}: {}", e, truncate(&body))))
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

/// Accepts `"<token>"` or `"Bearer <token>"`; blank means no token.
fn normalize_bearer_token(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let token = if trimmed.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("bearer ")) {
        trimmed[7..].trim()
    } else {
        trimmed
    };
    (!token.is_empty()).then(|| token.to_string())
}
