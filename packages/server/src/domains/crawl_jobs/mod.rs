//! Crawl jobs domain: one job kind (fetch-and-summarize a URL), its lifecycle,
//! reconciliation against the crawl worker, and staleness detection.

pub mod actions;
pub mod errors;
pub mod models;
pub mod poller;
pub mod staleness;
pub mod store;

pub use actions::{
    validate_url, ActionResult, CheckOutcome, CrawlJobLifecycle, LifecycleConfig, JOB_CREATED,
    JOB_DELETED, JOB_RESUBMITTED,
};
pub use errors::CrawlJobError;
pub use models::{CrawlJob, CrawlJobStatus, JobAction, JobTransition};
pub use poller::{JobView, PollScheduler, PollerConfig, ReconciliationPoller, TickReport, ViewScope};
pub use staleness::{StalenessConfig, StalenessDetector, StalenessReport};
pub use store::PostgresCrawlJobStore;
