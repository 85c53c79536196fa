//! Crawl job actions - lifecycle operations over the injected store and worker.
//!
//! Mutating actions return `Result<String, CrawlJobError>` where the `Ok`
//! value is the message shown to the user. The HTTP layer folds both sides
//! into an [`ActionResult`].

mod lifecycle;
mod reconcile;

use serde::Serialize;

pub use lifecycle::{
    validate_url, CrawlJobLifecycle, LifecycleConfig, JOB_CREATED, JOB_DELETED, JOB_RESUBMITTED,
};
pub use reconcile::CheckOutcome;

use super::errors::CrawlJobError;

/// `{success, message}` reply for user-facing mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl From<Result<String, CrawlJobError>> for ActionResult {
    fn from(result: Result<String, CrawlJobError>) -> Self {
        match result {
            Ok(message) => Self {
                success: true,
                message,
            },
            Err(e) => Self {
                success: false,
                message: e.to_string(),
            },
        }
    }
}
