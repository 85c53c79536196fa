//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::domains::auth::JwtService;
use crate::domains::crawl_jobs::{CrawlJobLifecycle, PollerConfig, StalenessDetector};
use crate::kernel::BaseCrawlJobStore;
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::{
    check_sites_handler, create_job_handler, delete_job_handler, health_handler,
    list_jobs_handler, reconcile_jobs_handler, retry_job_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub store: Arc<dyn BaseCrawlJobStore>,
    pub lifecycle: CrawlJobLifecycle,
    pub detector: Arc<StalenessDetector>,
    pub jwt_service: Arc<JwtService>,
    pub cron_secret: Arc<str>,
    pub poller_config: PollerConfig,
}

/// Build the Axum application router
///
/// An empty `allowed_origins` list allows any origin.
pub fn build_app(state: AxumAppState, allowed_origins: &[String]) -> Router {
    let allow_origin = if allowed_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    // Clone jwt_service for middleware closure
    let jwt_service_for_middleware = state.jwt_service.clone();

    Router::new()
        .route("/api/jobs", get(list_jobs_handler).post(create_job_handler))
        .route("/api/jobs/reconcile", post(reconcile_jobs_handler))
        .route("/api/jobs/:id/retry", post(retry_job_handler))
        .route("/api/jobs/:id", axum::routing::delete(delete_job_handler))
        // Cron trigger authenticates with the shared secret, not a user JWT
        .route("/api/cron/check-sites", get(check_sites_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(move |req, next| {
            jwt_auth_middleware(jwt_service_for_middleware.clone(), req, next)
        }))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
