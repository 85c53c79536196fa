//! Dispatch to the crawl worker and reconciliation of its answers.

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::lifecycle::CrawlJobLifecycle;
use crate::common::CrawlJobId;
use crate::domains::crawl_jobs::errors::CrawlJobError;
use crate::domains::crawl_jobs::models::{CrawlJob, CrawlJobStatus, JobTransition};
use crate::kernel::{BaseCrawlJobStore, PollOutcome, SubmitOutcome};

/// What a single `check_status` call observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The job was already terminal in the snapshot we were given.
    NotPending,
    /// No external id yet, still inside the abandonment window, or the
    /// worker acknowledged the job after our snapshot was taken.
    AwaitingDispatch,
    /// No external id past the abandonment window; marked failed.
    Abandoned,
    StillRunning,
    Completed,
    Failed,
    /// Polling itself failed; state left unchanged for the next cycle.
    TransportError,
}

impl CrawlJobLifecycle {
    /// Submit `job` to the worker on a detached task.
    ///
    /// The returned handle may be dropped; the task records its own outcome.
    pub fn dispatch(&self, job: CrawlJob) -> JoinHandle<()> {
        let store = self.store.clone();
        let worker = self.worker.clone();

        tokio::spawn(async move {
            let transition = match worker.submit(&job.target_url).await {
                Ok(SubmitOutcome::Accepted { external_job_id }) => {
                    debug!(job_id = %job.id, external_job_id = %external_job_id, "Dispatch acknowledged");
                    JobTransition::Acknowledged { external_job_id }
                }
                Ok(SubmitOutcome::CompletedImmediately { result, validators }) => {
                    debug!(job_id = %job.id, "Worker completed job synchronously");
                    JobTransition::Completed { result, validators }
                }
                Err(e) => {
                    let err = CrawlJobError::UpstreamDispatchFailure(format!("{:#}", e));
                    warn!(job_id = %job.id, target_url = %job.target_url, error = %err, "Dispatch failed");
                    JobTransition::Failed
                }
            };

            record_transition(store.as_ref(), job.id, &transition).await;
        })
    }

    /// Reconcile one pending job against the worker.
    ///
    /// Never returns an error: transport failures are logged and retried on
    /// the next cycle, worker-reported failures fail the job.
    pub async fn check_status(&self, job: &CrawlJob) -> CheckOutcome {
        if job.status != CrawlJobStatus::Pending {
            return CheckOutcome::NotPending;
        }

        let Some(external_job_id) = job.external_job_id.as_deref() else {
            if job.is_abandoned(Utc::now(), self.config.abandon_after) {
                let transition = JobTransition::Abandoned;
                if record_transition(self.store.as_ref(), job.id, &transition).await {
                    warn!(
                        job_id = %job.id,
                        error = %CrawlJobError::AbandonedDispatch,
                        "Failed abandoned job"
                    );
                    return CheckOutcome::Abandoned;
                }
            }
            return CheckOutcome::AwaitingDispatch;
        };

        match self.worker.poll(external_job_id).await {
            Ok(PollOutcome::Running) => CheckOutcome::StillRunning,
            Ok(PollOutcome::Completed { result, validators }) => {
                let transition = JobTransition::Completed { result, validators };
                record_transition(self.store.as_ref(), job.id, &transition).await;
                CheckOutcome::Completed
            }
            Ok(PollOutcome::Failed { reason }) => {
                let err = CrawlJobError::UpstreamPollTerminalFailure(reason);
                warn!(job_id = %job.id, external_job_id = %external_job_id, error = %err, "Worker failed job");
                record_transition(self.store.as_ref(), job.id, &JobTransition::Failed).await;
                CheckOutcome::Failed
            }
            Err(e) => {
                let err = CrawlJobError::UpstreamPollFailure(format!("{:#}", e));
                warn!(job_id = %job.id, external_job_id = %external_job_id, error = %err, "Poll failed, retrying next cycle");
                CheckOutcome::TransportError
            }
        }
    }
}

/// Write a transition, logging instead of propagating. Returns whether a row
/// changed.
///
/// A zero-row update means the job was deleted, already terminal, or (for
/// `Abandoned`) acknowledged in the meantime; the late answer is discarded.
async fn record_transition(
    store: &dyn BaseCrawlJobStore,
    id: CrawlJobId,
    transition: &JobTransition,
) -> bool {
    match store.apply_transition(id, transition).await {
        Ok(true) => {
            info!(job_id = %id, transition = transition.label(), "Crawl job updated");
            true
        }
        Ok(false) => {
            debug!(
                job_id = %id,
                transition = transition.label(),
                "Job no longer eligible; update dropped"
            );
            false
        }
        Err(e) => {
            error!(
                job_id = %id,
                transition = transition.label(),
                error = %e,
                "Failed to record crawl job transition"
            );
            false
        }
    }
}
