use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{BaseCrawlWorker, CacheValidators, PollOutcome, SubmitOutcome};

pub const DEFAULT_WORKER_BASE_URL: &str = "https://llms-txt-crawler-api.onrender.com";

/// Connection settings for the crawl worker.
///
/// The API key identifies this service to the worker, never the end user.
#[derive(Debug, Clone)]
pub struct WorkerClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl WorkerClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for the external crawl worker
pub struct CrawlWorkerClient {
    config: WorkerClientConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    url: &'a str,
}

/// Success body of `POST /generate-llms-txt`.
///
/// Either `{job_id}` or `{status: "completed_immediately", result}`.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    last_modified: Option<String>,
}

/// Error body: `{detail: "..."}` or `{detail: [{msg: "..."}]}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Items(Vec<ErrorItem>),
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    msg: String,
}

const COMPLETED_IMMEDIATELY: &str = "completed_immediately";

impl CrawlWorkerClient {
    pub fn new(config: WorkerClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Extract the human-readable reason from a worker error body.
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.detail)
        .and_then(|detail| match detail {
            ErrorDetail::Message(msg) => Some(msg),
            ErrorDetail::Items(items) => items.into_iter().next().map(|item| item.msg),
        });

    detail.unwrap_or_else(|| {
        format!(
            "API error: {}",
            status.canonical_reason().unwrap_or(status.as_str())
        )
    })
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub(crate) fn validators_from_headers(headers: &HeaderMap) -> CacheValidators {
    CacheValidators::new(
        header_string(headers, ETAG),
        header_string(headers, LAST_MODIFIED),
    )
}

#[async_trait]
impl BaseCrawlWorker for CrawlWorkerClient {
    async fn submit(&self, url: &str) -> Result<SubmitOutcome> {
        let response = self
            .client
            .post(self.endpoint("generate-llms-txt"))
            .bearer_auth(&self.config.api_key)
            .json(&SubmitRequest { url })
            .send()
            .await
            .context("Failed to send crawl request to worker")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read worker response")?;

        if !status.is_success() {
            anyhow::bail!(error_message(status, &body));
        }

        let parsed: SubmitResponse =
            serde_json::from_str(&body).context("Failed to parse worker response")?;

        if parsed.status.as_deref() == Some(COMPLETED_IMMEDIATELY) {
            let result = parsed
                .result
                .context("Worker reported immediate completion without a result")?;
            return Ok(SubmitOutcome::CompletedImmediately {
                result,
                validators: CacheValidators::new(parsed.etag, parsed.last_modified),
            });
        }

        let external_job_id = parsed
            .job_id
            .context("Worker response did not include a job_id")?;

        Ok(SubmitOutcome::Accepted { external_job_id })
    }

    async fn poll(&self, external_job_id: &str) -> Result<PollOutcome> {
        let response = self
            .client
            .get(self.endpoint(&format!("crawl-status/{}", external_job_id)))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .context("Failed to poll crawl status")?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(PollOutcome::Running);
        }

        // The worker relays the origin's ETag/Last-Modified on the completed
        // status response. Anything in front of it must not rewrite them.
        let validators = validators_from_headers(response.headers());
        let body = response
            .text()
            .await
            .context("Failed to read crawl status body")?;

        if status == StatusCode::OK {
            return Ok(PollOutcome::Completed {
                result: body,
                validators,
            });
        }

        let reason = if body.trim().is_empty() {
            format!("Worker returned {}", status)
        } else {
            body
        };
        Ok(PollOutcome::Failed { reason })
    }
}
