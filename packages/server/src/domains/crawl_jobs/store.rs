//! Postgres implementation of the crawl job store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use crate::common::{CrawlJobId, OwnerId};
use crate::domains::crawl_jobs::models::{CrawlJob, JobTransition};
use crate::kernel::BaseCrawlJobStore;

/// `BaseCrawlJobStore` backed by the `crawl_jobs` table.
#[derive(Clone)]
pub struct PostgresCrawlJobStore {
    pool: PgPool,
}

impl PostgresCrawlJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BaseCrawlJobStore for PostgresCrawlJobStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn insert(&self, job: &CrawlJob) -> Result<CrawlJob> {
        job.insert(&self.pool).await
    }

    async fn find_for_owner(&self, id: CrawlJobId, owner_id: OwnerId) -> Result<Option<CrawlJob>> {
        CrawlJob::find_for_owner(id, owner_id, &self.pool).await
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<CrawlJob>> {
        CrawlJob::find_by_owner(owner_id, &self.pool).await
    }

    async fn list_pending(&self, owner_id: Option<OwnerId>) -> Result<Vec<CrawlJob>> {
        CrawlJob::find_pending(owner_id, &self.pool).await
    }

    async fn apply_transition(&self, id: CrawlJobId, transition: &JobTransition) -> Result<bool> {
        CrawlJob::transition(id, transition, &self.pool).await
    }

    async fn replace_for_owner(
        &self,
        original: CrawlJobId,
        owner_id: OwnerId,
        replacement: &CrawlJob,
    ) -> Result<Option<CrawlJob>> {
        replacement.replace(original, owner_id, &self.pool).await
    }

    async fn delete_for_owner(&self, id: CrawlJobId, owner_id: OwnerId) -> Result<bool> {
        CrawlJob::delete_for_owner(id, owner_id, &self.pool).await
    }

    async fn latest_completed_per_url(&self) -> Result<Vec<CrawlJob>> {
        CrawlJob::find_latest_completed_per_url(&self.pool).await
    }

    async fn mark_stale_by_url(&self, target_url: &str) -> Result<u64> {
        CrawlJob::mark_stale_by_url(target_url, &self.pool).await
    }
}
