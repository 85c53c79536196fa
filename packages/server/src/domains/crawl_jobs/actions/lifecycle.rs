//! User-facing crawl job operations: create, retry, delete, list.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::common::{CrawlJobId, OwnerId};
use crate::domains::crawl_jobs::errors::CrawlJobError;
use crate::domains::crawl_jobs::models::CrawlJob;
use crate::kernel::{BaseCrawlJobStore, BaseCrawlWorker};

pub const JOB_CREATED: &str = "Job created successfully!";
pub const JOB_RESUBMITTED: &str = "Job resubmitted successfully!";
pub const JOB_DELETED: &str = "Job deleted successfully!";

/// Tunables for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// A pending job still lacking an external id after this long is failed.
    pub abandon_after: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            abandon_after: Duration::minutes(2),
        }
    }
}

/// Creates crawl jobs, dispatches them to the worker, and reconciles the
/// worker's answers into the store.
///
/// Cheap to clone; every clone shares the same store, worker and change feed.
#[derive(Clone)]
pub struct CrawlJobLifecycle {
    pub(super) store: Arc<dyn BaseCrawlJobStore>,
    pub(super) worker: Arc<dyn BaseCrawlWorker>,
    pub(super) config: LifecycleConfig,
    changes: Arc<watch::Sender<u64>>,
}

impl CrawlJobLifecycle {
    pub fn new(
        store: Arc<dyn BaseCrawlJobStore>,
        worker: Arc<dyn BaseCrawlWorker>,
        config: LifecycleConfig,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            store,
            worker,
            config,
            changes: Arc::new(changes),
        }
    }

    pub fn store(&self) -> &Arc<dyn BaseCrawlJobStore> {
        &self.store
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Generation counter bumped whenever a new pending job is inserted.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_created(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Insert a pending job and start its dispatch in the background.
    ///
    /// Returns once the row exists; the dispatch outcome is never awaited.
    pub async fn create(&self, url: &str, owner_id: OwnerId) -> Result<String, CrawlJobError> {
        let target_url = validate_url(url)?;

        let job = self
            .store
            .insert(&CrawlJob::pending(owner_id, target_url))
            .await?;

        info!(
            job_id = %job.id,
            owner_id = %owner_id,
            target_url = %job.target_url,
            "Crawl job created"
        );

        self.notify_created();
        drop(self.dispatch(job));

        Ok(JOB_CREATED.to_string())
    }

    /// Replace a failed or stale job with a fresh pending one for the same URL.
    ///
    /// The replacement insert and the original delete commit together, and the
    /// replacement is dispatched only afterwards. Any in-flight reconciliation
    /// of the original then lands on a missing row and is dropped by the store.
    pub async fn retry(&self, job_id: CrawlJobId, owner_id: OwnerId) -> Result<String, CrawlJobError> {
        let original = self
            .store
            .find_for_owner(job_id, owner_id)
            .await?
            .ok_or(CrawlJobError::NotFound)?;

        let replacement = self
            .store
            .replace_for_owner(
                original.id,
                owner_id,
                &CrawlJob::pending(owner_id, original.target_url.clone()),
            )
            .await?
            .ok_or_else(|| {
                debug!(job_id = %original.id, "Original job gone before retry");
                CrawlJobError::NotFound
            })?;

        self.notify_created();
        drop(self.dispatch(replacement.clone()));

        info!(
            job_id = %original.id,
            replacement_id = %replacement.id,
            target_url = %replacement.target_url,
            was_stale = original.is_stale,
            "Crawl job resubmitted"
        );

        Ok(JOB_RESUBMITTED.to_string())
    }

    pub async fn delete(&self, job_id: CrawlJobId, owner_id: OwnerId) -> Result<String, CrawlJobError> {
        if !self.store.delete_for_owner(job_id, owner_id).await? {
            warn!(job_id = %job_id, owner_id = %owner_id, "Delete matched no job");
            return Err(CrawlJobError::NotFound);
        }

        info!(job_id = %job_id, "Crawl job deleted");
        Ok(JOB_DELETED.to_string())
    }

    pub async fn list(&self, owner_id: OwnerId) -> Result<Vec<CrawlJob>, CrawlJobError> {
        Ok(self.store.list_for_owner(owner_id).await?)
    }
}

/// Accept only absolute http(s) URLs. The trimmed input is stored as typed.
pub fn validate_url(input: &str) -> Result<String, CrawlJobError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CrawlJobError::MissingUrl);
    }

    let parsed = Url::parse(trimmed).map_err(|e| CrawlJobError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(trimmed.to_string()),
        scheme => Err(CrawlJobError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            scheme
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_accepts_http_and_https() {
        assert_eq!(
            validate_url("  https://example.com ").unwrap(),
            "https://example.com"
        );
        assert!(validate_url("http://example.com/docs").is_ok());
    }

    #[test]
    fn validate_url_rejects_empty_input() {
        assert!(matches!(validate_url("   "), Err(CrawlJobError::MissingUrl)));
    }

    #[test]
    fn validate_url_rejects_other_schemes_and_garbage() {
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(CrawlJobError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("example.com"),
            Err(CrawlJobError::InvalidUrl(_))
        ));
    }
}
