use thiserror::Error;

use crate::common::AuthError;

/// Failures of crawl job operations.
///
/// Only `AuthenticationRequired`, `NotFound`, `InvalidUrl` and `Store` ever
/// reach a user. The upstream and probe variants describe background failures
/// that are logged where they happen.
#[derive(Error, Debug)]
pub enum CrawlJobError {
    #[error("User not authenticated")]
    AuthenticationRequired,

    /// Absent and not-owned are deliberately indistinguishable.
    #[error("Job not found or permission denied")]
    NotFound,

    #[error("Please enter a URL.")]
    MissingUrl,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Crawl worker rejected the job: {0}")]
    UpstreamDispatchFailure(String),

    #[error("Failed to poll crawl worker: {0}")]
    UpstreamPollFailure(String),

    #[error("Crawl worker reported failure: {0}")]
    UpstreamPollTerminalFailure(String),

    #[error("Dispatch was never acknowledged by the crawl worker")]
    AbandonedDispatch,

    #[error("Failed to check URL {url}: {reason}")]
    ProbeFailure { url: String, reason: String },

    #[error("{0}")]
    Store(#[from] anyhow::Error),
}

impl From<AuthError> for CrawlJobError {
    fn from(_: AuthError) -> Self {
        CrawlJobError::AuthenticationRequired
    }
}
