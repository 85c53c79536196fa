// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no lifecycle rules.
// State transitions live in domains/crawl_jobs and are expressed through these seams.
//
// Naming convention: Base* for trait names (e.g., BaseCrawlWorker, BaseSiteProbe)

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::{CrawlJobId, OwnerId};
use crate::domains::crawl_jobs::models::{CrawlJob, JobTransition};

// =============================================================================
// Cache validators (shared by worker results, probes and stored jobs)
// =============================================================================

/// `ETag` / `Last-Modified` pair observed for an origin URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    pub fn new(etag: Option<String>, last_modified: Option<String>) -> Self {
        Self {
            etag,
            last_modified,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

// =============================================================================
// Crawl Worker Trait (Infrastructure - external crawl execution service)
// =============================================================================

/// Outcome of handing a URL to the crawl worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Worker queued the crawl and will report through `poll`.
    Accepted { external_job_id: String },
    /// Worker finished synchronously and returned the artifact inline.
    CompletedImmediately {
        result: String,
        validators: CacheValidators,
    },
}

/// Worker-reported state of a deferred crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Running,
    Completed {
        result: String,
        validators: CacheValidators,
    },
    /// Any non-running, non-success answer. Terminal for the job.
    Failed { reason: String },
}

#[async_trait]
pub trait BaseCrawlWorker: Send + Sync {
    /// Submit a URL for crawling.
    ///
    /// Errors cover transport failures, timeouts and non-2xx answers alike.
    async fn submit(&self, url: &str) -> Result<SubmitOutcome>;

    /// Ask for the status of a previously accepted crawl.
    ///
    /// Errors are transport-level only; a worker-reported failure is
    /// `Ok(PollOutcome::Failed { .. })`.
    ///
    /// Validators on `Completed` must describe the crawled origin, not the
    /// status response. They become the baseline the staleness batch compares
    /// against, so a worker (or proxy in front of it) that stamps its own
    /// `ETag` on the status response would flag every job on the next run.
    async fn poll(&self, external_job_id: &str) -> Result<PollOutcome>;
}

// =============================================================================
// Site Probe Trait (Infrastructure - origin metadata requests)
// =============================================================================

#[async_trait]
pub trait BaseSiteProbe: Send + Sync {
    /// Issue a metadata-only request against the origin and return its validators.
    async fn head(&self, url: &str) -> Result<CacheValidators>;
}

// =============================================================================
// Crawl Job Store Trait (Infrastructure - persisted job records)
// =============================================================================

/// Persisted crawl jobs.
///
/// Owner-scoped methods never reveal rows belonging to someone else. The two
/// system methods at the bottom read and write across owners and must only be
/// reachable from the cron-secret gated staleness batch.
#[async_trait]
pub trait BaseCrawlJobStore: Send + Sync {
    /// Cheap connectivity check for health endpoints.
    async fn ping(&self) -> Result<()>;

    async fn insert(&self, job: &CrawlJob) -> Result<CrawlJob>;

    async fn find_for_owner(&self, id: CrawlJobId, owner_id: OwnerId) -> Result<Option<CrawlJob>>;

    /// All jobs of one owner, newest first.
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<CrawlJob>>;

    /// Pending jobs, optionally restricted to one owner, oldest first.
    async fn list_pending(&self, owner_id: Option<OwnerId>) -> Result<Vec<CrawlJob>>;

    /// Apply a lifecycle transition to a job that is still `pending`.
    ///
    /// Returns `false` when no row was affected: the job was deleted (for
    /// example superseded by a retry) or already reached a terminal state.
    async fn apply_transition(&self, id: CrawlJobId, transition: &JobTransition) -> Result<bool>;

    /// Atomically insert `replacement` and delete the owner's `original` job.
    ///
    /// Returns `None`, with nothing written, when `original` does not exist for
    /// `owner_id`.
    async fn replace_for_owner(
        &self,
        original: CrawlJobId,
        owner_id: OwnerId,
        replacement: &CrawlJob,
    ) -> Result<Option<CrawlJob>>;

    /// Returns `false` when the owner has no such job.
    async fn delete_for_owner(&self, id: CrawlJobId, owner_id: OwnerId) -> Result<bool>;

    /// Most recent completed, not yet stale, job for every distinct target URL (all owners).
    async fn latest_completed_per_url(&self) -> Result<Vec<CrawlJob>>;

    /// Flag every completed job for `target_url` as stale (all owners).
    async fn mark_stale_by_url(&self, target_url: &str) -> Result<u64>;
}
