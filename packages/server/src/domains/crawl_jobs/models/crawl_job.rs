//! Crawl job model - one fetch-and-summarize request and its lifecycle record.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{CrawlJobId, OwnerId};
use crate::kernel::CacheValidators;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "crawl_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CrawlJobStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl CrawlJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlJobStatus::Completed | CrawlJobStatus::Failed)
    }
}

/// Actions a renderer may offer for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Show (and copy) the generated artifact.
    ViewResult,
    /// Resubmit a failed job.
    Retry,
    /// Resubmit a stale job. Same operation as `Retry`.
    Recrawl,
    Delete,
}

/// A state change applied to a `pending` job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    /// Worker acknowledged the dispatch; job stays pending.
    Acknowledged { external_job_id: String },
    Completed {
        result: String,
        validators: CacheValidators,
    },
    Failed,
    /// Fail a job the worker never acknowledged. Only applies while the job
    /// still has no external id.
    Abandoned,
}

impl JobTransition {
    pub fn label(&self) -> &'static str {
        match self {
            JobTransition::Acknowledged { .. } => "acknowledged",
            JobTransition::Completed { .. } => "completed",
            JobTransition::Failed => "failed",
            JobTransition::Abandoned => "abandoned",
        }
    }
}

// ============================================================================
// CrawlJob Model
// ============================================================================

#[derive(FromRow, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct CrawlJob {
    #[builder(default = CrawlJobId::new())]
    pub id: CrawlJobId,

    #[sqlx(rename = "user_id")]
    pub owner_id: OwnerId,
    pub target_url: String,

    /// Assigned by the worker once dispatch is acknowledged.
    #[sqlx(rename = "job_id")]
    #[builder(default, setter(strip_option))]
    pub external_job_id: Option<String>,

    #[builder(default)]
    pub status: CrawlJobStatus,
    #[builder(default, setter(strip_option))]
    pub result: Option<String>,
    #[builder(default = false)]
    pub is_stale: bool,

    // Cache validators captured at crawl time
    #[sqlx(rename = "etag_header")]
    #[builder(default, setter(strip_option))]
    pub etag: Option<String>,
    #[sqlx(rename = "last_modified_header")]
    #[builder(default, setter(strip_option))]
    pub last_modified: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl CrawlJob {
    /// A fresh pending job with no external id, result or validators.
    pub fn pending(owner_id: OwnerId, target_url: impl Into<String>) -> Self {
        Self::builder()
            .owner_id(owner_id)
            .target_url(target_url)
            .build()
    }

    pub fn validators(&self) -> CacheValidators {
        CacheValidators::new(self.etag.clone(), self.last_modified.clone())
    }

    /// Pending, never acknowledged by the worker, and older than `threshold`.
    pub fn is_abandoned(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == CrawlJobStatus::Pending
            && self.external_job_id.is_none()
            && now - self.created_at > threshold
    }

    /// `result` is set iff completed; `is_stale` only on completed jobs.
    pub fn is_consistent(&self) -> bool {
        let completed = self.status == CrawlJobStatus::Completed;
        self.result.is_some() == completed && (!self.is_stale || completed)
    }

    pub fn available_actions(&self) -> Vec<JobAction> {
        let mut actions = Vec::with_capacity(2);
        if self.is_stale {
            actions.push(JobAction::Recrawl);
        } else {
            match self.status {
                CrawlJobStatus::Completed if self.result.is_some() => {
                    actions.push(JobAction::ViewResult)
                }
                CrawlJobStatus::Failed => actions.push(JobAction::Retry),
                _ => {}
            }
        }
        actions.push(JobAction::Delete);
        actions
    }

    /// Apply a transition in memory, mirroring the conditional SQL updates.
    ///
    /// Returns `false` (and leaves the job untouched) unless the job is pending.
    /// `Abandoned` additionally requires a missing external id.
    pub fn apply(&mut self, transition: &JobTransition) -> bool {
        if self.status != CrawlJobStatus::Pending {
            return false;
        }
        if matches!(transition, JobTransition::Abandoned) && self.external_job_id.is_some() {
            return false;
        }
        match transition {
            JobTransition::Acknowledged { external_job_id } => {
                self.external_job_id = Some(external_job_id.clone());
            }
            JobTransition::Completed { result, validators } => {
                self.status = CrawlJobStatus::Completed;
                self.result = Some(result.clone());
                self.etag = validators.etag.clone();
                self.last_modified = validators.last_modified.clone();
            }
            JobTransition::Failed | JobTransition::Abandoned => {
                self.status = CrawlJobStatus::Failed;
            }
        }
        true
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO crawl_jobs (
                id, user_id, target_url, job_id, status, result, is_stale,
                etag_header, last_modified_header, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.owner_id)
        .bind(&self.target_url)
        .bind(&self.external_job_id)
        .bind(self.status)
        .bind(&self.result)
        .bind(self.is_stale)
        .bind(&self.etag)
        .bind(&self.last_modified)
        .bind(self.created_at)
        .fetch_one(pool)
        .await
        .context("Failed to create job in database.")
    }

    /// Insert `self` and delete the owner's `original` row in one transaction.
    ///
    /// Returns `None` (and rolls back) when `original` does not exist for
    /// `owner_id`.
    pub async fn replace(
        &self,
        original: CrawlJobId,
        owner_id: OwnerId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let mut tx = pool
            .begin()
            .await
            .context("Failed to start retry transaction")?;

        let deleted = sqlx::query("DELETE FROM crawl_jobs WHERE id = $1 AND user_id = $2")
            .bind(original)
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete superseded crawl job")?;

        if deleted.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("Failed to roll back retry transaction")?;
            return Ok(None);
        }

        let inserted = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO crawl_jobs (
                id, user_id, target_url, job_id, status, result, is_stale,
                etag_header, last_modified_header, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.owner_id)
        .bind(&self.target_url)
        .bind(&self.external_job_id)
        .bind(self.status)
        .bind(&self.result)
        .bind(self.is_stale)
        .bind(&self.etag)
        .bind(&self.last_modified)
        .bind(self.created_at)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to create replacement job in database.")?;

        tx.commit()
            .await
            .context("Failed to commit retry transaction")?;

        Ok(Some(inserted))
    }

    pub async fn find_for_owner(
        id: CrawlJobId,
        owner_id: OwnerId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM crawl_jobs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
            .context("Failed to load crawl job")
    }

    pub async fn find_by_owner(owner_id: OwnerId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM crawl_jobs WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .context("Failed to list crawl jobs")
    }

    pub async fn find_pending(owner_id: Option<OwnerId>, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM crawl_jobs
            WHERE status = 'pending'
              AND ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .context("Failed to list pending crawl jobs")
    }

    /// Conditional on `status = 'pending'`; a late update against a deleted or
    /// terminal row affects zero rows. `Abandoned` also requires `job_id IS NULL`
    /// so an acknowledgement racing the abandonment check wins.
    pub async fn transition(
        id: CrawlJobId,
        transition: &JobTransition,
        pool: &PgPool,
    ) -> Result<bool> {
        let result = match transition {
            JobTransition::Acknowledged { external_job_id } => {
                sqlx::query(
                    r#"
                    UPDATE crawl_jobs
                    SET job_id = $2
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .bind(external_job_id)
                .execute(pool)
                .await
            }
            JobTransition::Completed { result, validators } => {
                sqlx::query(
                    r#"
                    UPDATE crawl_jobs
                    SET status = 'completed',
                        result = $2,
                        etag_header = $3,
                        last_modified_header = $4
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .bind(result)
                .bind(&validators.etag)
                .bind(&validators.last_modified)
                .execute(pool)
                .await
            }
            JobTransition::Failed => {
                sqlx::query(
                    r#"
                    UPDATE crawl_jobs
                    SET status = 'failed'
                    WHERE id = $1 AND status = 'pending'
                    "#,
                )
                .bind(id)
                .execute(pool)
                .await
            }
            JobTransition::Abandoned => {
                sqlx::query(
                    r#"
                    UPDATE crawl_jobs
                    SET status = 'failed'
                    WHERE id = $1 AND status = 'pending' AND job_id IS NULL
                    "#,
                )
                .bind(id)
                .execute(pool)
                .await
            }
        }
        .with_context(|| format!("Failed to mark crawl job {}", transition.label()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_owner(id: CrawlJobId, owner_id: OwnerId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM crawl_jobs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await
            .context("Failed to delete crawl job")?;

        Ok(result.rows_affected() > 0)
    }

    /// Latest completed, non-stale job per target URL across every owner.
    pub async fn find_latest_completed_per_url(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT DISTINCT ON (target_url) *
            FROM crawl_jobs
            WHERE status = 'completed' AND is_stale = false
            ORDER BY target_url, created_at DESC, id DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to load latest job for each url")
    }

    pub async fn mark_stale_by_url(target_url: &str, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET is_stale = true
            WHERE target_url = $1 AND status = 'completed'
            "#,
        )
        .bind(target_url)
        .execute(pool)
        .await
        .context("Failed to flag stale crawl jobs")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> CrawlJob {
        CrawlJob::pending(OwnerId::new(), "https://example.com")
    }

    #[test]
    fn pending_job_starts_clean() {
        let job = job();
        assert_eq!(job.status, CrawlJobStatus::Pending);
        assert!(job.external_job_id.is_none());
        assert!(job.result.is_none());
        assert!(!job.is_stale);
        assert!(job.is_consistent());
    }

    #[test]
    fn completion_sets_result_and_validators() {
        let mut job = job();
        let applied = job.apply(&JobTransition::Completed {
            result: "# Example\n".into(),
            validators: CacheValidators::new(Some("\"v1\"".into()), None),
        });

        assert!(applied);
        assert_eq!(job.status, CrawlJobStatus::Completed);
        assert_eq!(job.result.as_deref(), Some("# Example\n"));
        assert_eq!(job.etag.as_deref(), Some("\"v1\""));
        assert!(job.is_consistent());
    }

    #[test]
    fn terminal_jobs_ignore_transitions() {
        let mut job = job();
        assert!(job.apply(&JobTransition::Failed));
        assert!(!job.apply(&JobTransition::Completed {
            result: "late".into(),
            validators: CacheValidators::default(),
        }));
        assert!(!job.apply(&JobTransition::Acknowledged {
            external_job_id: "ext".into()
        }));
        assert_eq!(job.status, CrawlJobStatus::Failed);
        assert!(job.result.is_none());
        assert!(job.external_job_id.is_none());
    }

    #[test]
    fn abandonment_requires_missing_external_id_and_age() {
        let threshold = Duration::minutes(2);
        let now = Utc::now();

        let mut old = job();
        old.created_at = now - Duration::minutes(3);
        assert!(old.is_abandoned(now, threshold));

        let fresh = job();
        assert!(!fresh.is_abandoned(now, threshold));

        old.external_job_id = Some("ext-1".into());
        assert!(!old.is_abandoned(now, threshold));
    }

    #[test]
    fn abandonment_does_not_override_a_late_acknowledgement() {
        let mut job = job();
        assert!(job.apply(&JobTransition::Acknowledged {
            external_job_id: "ext-9".into()
        }));

        assert!(!job.apply(&JobTransition::Abandoned));
        assert_eq!(job.status, CrawlJobStatus::Pending);
        assert_eq!(job.external_job_id.as_deref(), Some("ext-9"));
    }

    #[test]
    fn stale_jobs_offer_recrawl_instead_of_result() {
        let mut job = job();
        job.apply(&JobTransition::Completed {
            result: "text".into(),
            validators: CacheValidators::default(),
        });
        assert_eq!(
            job.available_actions(),
            vec![JobAction::ViewResult, JobAction::Delete]
        );

        job.is_stale = true;
        assert_eq!(
            job.available_actions(),
            vec![JobAction::Recrawl, JobAction::Delete]
        );
    }

    #[test]
    fn failed_jobs_offer_retry() {
        let mut job = job();
        job.apply(&JobTransition::Failed);
        assert_eq!(job.available_actions(), vec![JobAction::Retry, JobAction::Delete]);
    }
}
