use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::common::{bearer_token, secret_matches, AuthError};
use crate::domains::crawl_jobs::StalenessReport;
use crate::server::app::AxumAppState;

#[derive(Debug, Serialize)]
pub struct CheckSitesResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: Option<StalenessReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckSitesResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            report: None,
            error: Some(error.into()),
        }
    }
}

/// GET /api/cron/check-sites
///
/// Scheduled trigger for the staleness batch. Authenticated with
/// `Authorization: Bearer <CRON_SECRET>` and runs across every owner.
pub async fn check_sites_handler(
    Extension(state): Extension<AxumAppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<CheckSitesResponse>) {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .map(|presented| secret_matches(presented, &state.cron_secret))
        .unwrap_or(false);

    if !authorized {
        tracing::warn!("Rejected staleness trigger with bad credentials");
        return (
            StatusCode::UNAUTHORIZED,
            Json(CheckSitesResponse::failure(
                AuthError::InvalidCronSecret.to_string(),
            )),
        );
    }

    match state.detector.run().await {
        Ok(report) => (
            StatusCode::OK,
            Json(CheckSitesResponse {
                success: true,
                report: Some(report),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Staleness check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CheckSitesResponse::failure(e.to_string())),
            )
        }
    }
}
