//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The staleness check is normally triggered by an external scheduler through
//! `GET /api/cron/check-sites`. When `STALENESS_CRON` is configured the same
//! batch also runs in-process:
//!
//! ```text
//! Scheduler (cron expression, e.g. hourly)
//!     │
//!     └─► StalenessDetector::run()
//!             └─► HEAD each latest completed URL → flag stale jobs
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::crawl_jobs::StalenessDetector;

/// Start the in-process staleness schedule
pub async fn start_scheduler(detector: Arc<StalenessDetector>, cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let staleness_job = Job::new_async(cron, move |_uuid, _lock| {
        let detector = detector.clone();
        Box::pin(async move {
            match detector.run().await {
                Ok(report) => tracing::info!(
                    sites_checked = report.sites_checked,
                    sites_updated = report.sites_updated,
                    "Scheduled staleness check finished"
                ),
                Err(e) => tracing::error!(error = %e, "Scheduled staleness check failed"),
            }
        })
    })
    .with_context(|| format!("Invalid staleness cron expression '{}'", cron))?;

    scheduler.add(staleness_job).await?;
    scheduler.start().await?;

    tracing::info!(cron = %cron, "Scheduled staleness checks started");
    Ok(scheduler)
}
