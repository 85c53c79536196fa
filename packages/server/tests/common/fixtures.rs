//! Job fixtures seeded straight into the in-memory store.

use chrono::{DateTime, Duration, Utc};
use crawl_tracker_core::common::OwnerId;
use crawl_tracker_core::domains::crawl_jobs::{CrawlJob, CrawlJobStatus};

pub fn pending_job(owner_id: OwnerId, url: &str, external_job_id: Option<&str>) -> CrawlJob {
    let mut job = CrawlJob::pending(owner_id, url);
    job.external_job_id = external_job_id.map(String::from);
    job
}

/// Pending job created `age` ago.
pub fn aged_pending_job(owner_id: OwnerId, url: &str, age: Duration) -> CrawlJob {
    let mut job = CrawlJob::pending(owner_id, url);
    job.created_at = Utc::now() - age;
    job
}

pub fn completed_job(
    owner_id: OwnerId,
    url: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
    created_at: DateTime<Utc>,
) -> CrawlJob {
    CrawlJob {
        status: CrawlJobStatus::Completed,
        result: Some(format!("# llms.txt for {}", url)),
        external_job_id: Some(format!("ext-{}", url.len())),
        etag: etag.map(String::from),
        last_modified: last_modified.map(String::from),
        created_at,
        ..CrawlJob::pending(owner_id, url)
    }
}

pub fn failed_job(owner_id: OwnerId, url: &str) -> CrawlJob {
    CrawlJob {
        status: CrawlJobStatus::Failed,
        ..CrawlJob::pending(owner_id, url)
    }
}
