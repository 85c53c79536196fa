//! Reconciliation poller.
//!
//! ```text
//! JobView (latest known jobs, watch channel)
//!     │
//!     ├─► idle until a pending job shows up (lifecycle change feed → refresh)
//!     │
//!     └─► PollScheduler: every `interval` while any job is pending
//!             ├─► check_status on every pending job, concurrently
//!             └─► refresh the view from the store
//! ```
//!
//! No backoff: transient poll failures are retried on the next tick and the
//! abandonment rule bounds how long a job can sit unacknowledged.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::actions::{CheckOutcome, CrawlJobLifecycle};
use super::models::{CrawlJob, CrawlJobStatus};
use crate::common::OwnerId;
use crate::kernel::BaseCrawlJobStore;

/// Configuration for the reconciliation poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Which jobs a view tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewScope {
    /// One user's dashboard: every job they own.
    Owner(OwnerId),
    /// Server-side reconciliation: pending jobs of every owner.
    AllOwners,
}

/// Latest known set of jobs, published through a watch channel.
pub struct JobView {
    scope: ViewScope,
    store: Arc<dyn BaseCrawlJobStore>,
    jobs: watch::Sender<Vec<CrawlJob>>,
}

impl JobView {
    pub fn new(scope: ViewScope, store: Arc<dyn BaseCrawlJobStore>) -> Self {
        let (jobs, _) = watch::channel(Vec::new());
        Self { scope, store, jobs }
    }

    pub fn scope(&self) -> ViewScope {
        self.scope
    }

    /// Reload the job list from the store.
    pub async fn refresh(&self) -> Result<()> {
        let jobs = match self.scope {
            ViewScope::Owner(owner_id) => self.store.list_for_owner(owner_id).await?,
            ViewScope::AllOwners => self.store.list_pending(None).await?,
        };
        self.jobs.send_replace(jobs);
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<CrawlJob> {
        self.jobs.borrow().clone()
    }

    pub fn pending(&self) -> Vec<CrawlJob> {
        self.jobs
            .borrow()
            .iter()
            .filter(|job| job.status == CrawlJobStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        self.jobs
            .borrow()
            .iter()
            .any(|job| job.status == CrawlJobStatus::Pending)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<CrawlJob>> {
        self.jobs.subscribe()
    }
}

/// Fixed-interval ticker, decoupled from what a tick does.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    interval: Duration,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run `tick` every interval for as long as `should_continue` holds.
    ///
    /// The predicate is re-evaluated before every sleep. Returns the number
    /// of ticks run.
    pub async fn run_while<P, F, Fut>(
        &self,
        should_continue: P,
        mut tick: F,
        shutdown: &CancellationToken,
    ) -> usize
    where
        P: Fn() -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticks = 0;
        while should_continue() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            tick().await;
            ticks += 1;
        }
        ticks
    }
}

/// Result of one reconciliation tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl TickReport {
    pub fn checked(&self) -> usize {
        self.outcomes.len()
    }

    pub fn count(&self, outcome: &CheckOutcome) -> usize {
        self.outcomes.iter().filter(|o| *o == outcome).count()
    }
}

pub struct ReconciliationPoller {
    lifecycle: CrawlJobLifecycle,
    view: Arc<JobView>,
    scheduler: PollScheduler,
}

impl ReconciliationPoller {
    pub fn new(lifecycle: CrawlJobLifecycle, view: Arc<JobView>, config: PollerConfig) -> Self {
        Self {
            lifecycle,
            view,
            scheduler: PollScheduler::new(config.interval),
        }
    }

    pub fn view(&self) -> &Arc<JobView> {
        &self.view
    }

    /// Check every pending job in the view concurrently, then refresh the view.
    pub async fn tick(&self) -> TickReport {
        let pending = self.view.pending();

        let outcomes = join_all(pending.iter().map(|job| self.lifecycle.check_status(job))).await;

        if let Err(e) = self.view.refresh().await {
            warn!(error = %e, "Failed to refresh job view after reconciliation");
        }

        debug!(checked = outcomes.len(), "Reconciliation tick finished");
        TickReport { outcomes }
    }

    /// Poll while pending jobs exist; idle until the lifecycle reports a new one.
    pub async fn run(self, shutdown: CancellationToken) {
        let this = &self;
        let mut changes = this.lifecycle.subscribe_changes();

        if let Err(e) = this.view.refresh().await {
            warn!(error = %e, "Initial job view refresh failed");
        }

        loop {
            if !this.view.has_pending() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if let Err(e) = this.view.refresh().await {
                            warn!(error = %e, "Job view refresh failed");
                        }
                        continue;
                    }
                }
            }

            info!(scope = ?this.view.scope(), "Reconciliation poller active");
            let ticks = this
                .scheduler
                .run_while(
                    || this.view.has_pending(),
                    move || async move {
                        this.tick().await;
                    },
                    &shutdown,
                )
                .await;

            if shutdown.is_cancelled() {
                break;
            }
            info!(ticks, "No pending jobs left, reconciliation poller idle");
        }

        info!("Reconciliation poller stopped");
    }
}
