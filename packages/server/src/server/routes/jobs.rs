//! Owner-scoped crawl job endpoints.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::common::CrawlJobId;
use crate::domains::crawl_jobs::{
    ActionResult, CrawlJob, CrawlJobError, JobAction, JobView, ReconciliationPoller, ViewScope,
};
use crate::server::app::AxumAppState;
use crate::server::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub url: String,
}

/// A job as rendered for its owner, with the actions the UI may offer.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: CrawlJob,
    pub actions: Vec<JobAction>,
}

impl From<CrawlJob> for JobResponse {
    fn from(job: CrawlJob) -> Self {
        let actions = job.available_actions();
        Self { job, actions }
    }
}

type ActionReply = (StatusCode, Json<ActionResult>);

fn status_for(error: &CrawlJobError) -> StatusCode {
    match error {
        CrawlJobError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        CrawlJobError::NotFound => StatusCode::NOT_FOUND,
        CrawlJobError::MissingUrl | CrawlJobError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn action_reply(result: Result<String, CrawlJobError>) -> ActionReply {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            if matches!(e, CrawlJobError::Store(_)) {
                tracing::error!(error = %e, "Crawl job action failed");
            }
            status_for(e)
        }
    };
    (status, Json(ActionResult::from(result)))
}

fn job_id_or_not_found(raw: &str) -> Result<CrawlJobId, CrawlJobError> {
    CrawlJobId::parse(raw).map_err(|_| CrawlJobError::NotFound)
}

/// POST /api/jobs
pub async fn create_job_handler(
    Extension(state): Extension<AxumAppState>,
    user: AuthUser,
    Json(request): Json<CreateJobRequest>,
) -> ActionReply {
    action_reply(state.lifecycle.create(&request.url, user.owner_id).await)
}

/// GET /api/jobs
pub async fn list_jobs_handler(
    Extension(state): Extension<AxumAppState>,
    user: AuthUser,
) -> Result<Json<Vec<JobResponse>>, ActionReply> {
    match state.lifecycle.list(user.owner_id).await {
        Ok(jobs) => Ok(Json(jobs.into_iter().map(JobResponse::from).collect())),
        Err(e) => Err(action_reply(Err(e))),
    }
}

/// POST /api/jobs/reconcile
///
/// One reconciliation tick over the caller's pending jobs, for clients that
/// drive their own polling loop. Returns the refreshed list.
pub async fn reconcile_jobs_handler(
    Extension(state): Extension<AxumAppState>,
    user: AuthUser,
) -> Result<Json<Vec<JobResponse>>, ActionReply> {
    let view = Arc::new(JobView::new(
        ViewScope::Owner(user.owner_id),
        state.store.clone(),
    ));
    if let Err(e) = view.refresh().await {
        return Err(action_reply(Err(CrawlJobError::Store(e))));
    }

    let poller = ReconciliationPoller::new(state.lifecycle.clone(), view, state.poller_config.clone());
    let report = poller.tick().await;
    tracing::debug!(owner_id = %user.owner_id, checked = report.checked(), "Client reconciliation");

    Ok(Json(
        poller
            .view()
            .snapshot()
            .into_iter()
            .map(JobResponse::from)
            .collect(),
    ))
}

/// POST /api/jobs/:id/retry
pub async fn retry_job_handler(
    Extension(state): Extension<AxumAppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ActionReply {
    let result = match job_id_or_not_found(&id) {
        Ok(job_id) => state.lifecycle.retry(job_id, user.owner_id).await,
        Err(e) => Err(e),
    };
    action_reply(result)
}

/// DELETE /api/jobs/:id
pub async fn delete_job_handler(
    Extension(state): Extension<AxumAppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ActionReply {
    let result = match job_id_or_not_found(&id) {
        Ok(job_id) => state.lifecycle.delete(job_id, user.owner_id).await,
        Err(e) => Err(e),
    };
    action_reply(result)
}
