//! HTTP client tests against throwaway local servers standing in for the
//! crawl worker and for probed origins.

mod common;

use std::time::Duration;

use axum::{
    extract::Path,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, head, post},
    Json, Router,
};
use crawl_tracker_core::kernel::{
    BaseCrawlWorker, BaseSiteProbe, CacheValidators, CrawlWorkerClient, HttpSiteProbe,
    PollOutcome, SubmitOutcome, WorkerClientConfig,
};
use serde_json::{json, Value};

use crate::common::spawn_stub;

const API_KEY: &str = "worker-key";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some("Bearer worker-key")
}

async fn client_for(router: Router) -> CrawlWorkerClient {
    let base_url = spawn_stub(router).await;
    CrawlWorkerClient::new(
        WorkerClientConfig::new(base_url, API_KEY).with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

// =============================================================================
// submit
// =============================================================================

#[tokio::test]
async fn submit_returns_external_job_id() {
    let router = Router::new().route(
        "/generate-llms-txt",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            if !authorized(&headers) {
                return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "bad key"})));
            }
            if body["url"] != "https://example.com" {
                return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "bad url"})));
            }
            (StatusCode::OK, Json(json!({"job_id": "job-123"})))
        }),
    );
    let client = client_for(router).await;

    let outcome = client.submit("https://example.com").await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            external_job_id: "job-123".to_string()
        }
    );
}

#[tokio::test]
async fn submit_recognizes_immediate_completion() {
    let router = Router::new().route(
        "/generate-llms-txt",
        post(|| async {
            Json(json!({
                "status": "completed_immediately",
                "result": "# Cached",
                "etag": "\"v1\""
            }))
        }),
    );
    let client = client_for(router).await;

    let outcome = client.submit("https://example.com").await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::CompletedImmediately {
            result: "# Cached".to_string(),
            validators: CacheValidators::new(Some("\"v1\"".to_string()), None),
        }
    );
}

#[tokio::test]
async fn submit_error_uses_detail_message() {
    let router = Router::new().route(
        "/generate-llms-txt",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"detail": "URL is not reachable"})),
            )
        }),
    );
    let client = client_for(router).await;

    let err = client.submit("https://example.com").await.unwrap_err();
    assert_eq!(err.to_string(), "URL is not reachable");
}

#[tokio::test]
async fn submit_error_uses_first_validation_message() {
    let router = Router::new().route(
        "/generate-llms-txt",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": [{"msg": "field required"}, {"msg": "other"}]})),
            )
        }),
    );
    let client = client_for(router).await;

    let err = client.submit("https://example.com").await.unwrap_err();
    assert_eq!(err.to_string(), "field required");
}

#[tokio::test]
async fn submit_error_without_body_uses_status_text() {
    let router = Router::new().route(
        "/generate-llms-txt",
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let client = client_for(router).await;

    let err = client.submit("https://example.com").await.unwrap_err();
    assert_eq!(err.to_string(), "API error: Service Unavailable");
}

#[tokio::test]
async fn submit_without_job_id_is_an_error() {
    let router = Router::new().route(
        "/generate-llms-txt",
        post(|| async { Json(json!({"status": "queued"})) }),
    );
    let client = client_for(router).await;

    assert!(client.submit("https://example.com").await.is_err());
}

// =============================================================================
// poll
// =============================================================================

async fn crawl_status(Path(id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, HeaderMap::new(), String::new());
    }
    match id.as_str() {
        "running" => (StatusCode::ACCEPTED, HeaderMap::new(), String::new()),
        "done" => {
            let mut headers = HeaderMap::new();
            headers.insert(header::ETAG, "\"v7\"".parse().unwrap());
            headers.insert(
                header::LAST_MODIFIED,
                "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
            );
            (StatusCode::OK, headers, "# Done".to_string())
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
            "crawl crashed".to_string(),
        ),
    }
}

#[tokio::test]
async fn poll_maps_worker_statuses() {
    let router = Router::new().route("/crawl-status/:id", get(crawl_status));
    let client = client_for(router).await;

    assert_eq!(client.poll("running").await.unwrap(), PollOutcome::Running);

    assert_eq!(
        client.poll("done").await.unwrap(),
        PollOutcome::Completed {
            result: "# Done".to_string(),
            validators: CacheValidators::new(
                Some("\"v7\"".to_string()),
                Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string()),
            ),
        }
    );

    assert!(matches!(
        client.poll("broken").await.unwrap(),
        PollOutcome::Failed { .. }
    ));
}

#[tokio::test]
async fn poll_transport_failure_is_an_error() {
    // Bind and immediately drop a listener so the port refuses connections
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = CrawlWorkerClient::new(
        WorkerClientConfig::new(format!("http://{}", addr), API_KEY)
            .with_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    assert!(client.poll("anything").await.is_err());
}

// =============================================================================
// HttpSiteProbe
// =============================================================================

#[tokio::test]
async fn probe_reads_cache_validators_from_head_response() {
    let router = Router::new().route(
        "/docs",
        head(|| async {
            (
                StatusCode::OK,
                [
                    (header::ETAG, "\"abc\""),
                    (header::LAST_MODIFIED, "Wed, 21 Oct 2015 07:28:00 GMT"),
                ],
            )
        }),
    );
    let base_url = spawn_stub(router).await;
    let probe = HttpSiteProbe::new(Duration::from_secs(5)).unwrap();

    let validators = probe.head(&format!("{}/docs", base_url)).await.unwrap();
    assert_eq!(
        validators,
        CacheValidators::new(
            Some("\"abc\"".to_string()),
            Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string()),
        )
    );
}

#[tokio::test]
async fn probe_of_origin_without_validators_returns_empty() {
    let router = Router::new().route("/plain", head(|| async { StatusCode::NOT_FOUND }));
    let base_url = spawn_stub(router).await;
    let probe = HttpSiteProbe::new(Duration::from_secs(5)).unwrap();

    let validators = probe.head(&format!("{}/plain", base_url)).await.unwrap();
    assert!(validators.is_empty());
}
