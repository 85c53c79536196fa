//! Test harness wiring the in-memory store and scripted collaborators into
//! the real lifecycle, detector and router.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use crawl_tracker_core::common::OwnerId;
use crawl_tracker_core::domains::auth::JwtService;
use crawl_tracker_core::domains::crawl_jobs::{
    CrawlJobLifecycle, LifecycleConfig, PollerConfig, StalenessConfig, StalenessDetector,
};
use crawl_tracker_core::kernel::{MockCrawlWorker, MockSiteProbe, TestDependencies};
use crawl_tracker_core::server::{build_app, AxumAppState};

pub const CRON_SECRET: &str = "test-cron-secret";
const JWT_SECRET: &str = "test-jwt-secret";
const JWT_ISSUER: &str = "crawl-tracker-tests";

pub fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Staleness settings that keep batches fast under real time.
pub fn fast_staleness_config() -> StalenessConfig {
    StalenessConfig {
        probe_delay: Duration::from_millis(1),
        probe_timeout: Duration::from_secs(1),
        budget: Duration::from_secs(60),
    }
}

pub struct TestHarness {
    pub deps: TestDependencies,
    pub lifecycle: CrawlJobLifecycle,
    pub detector: Arc<StalenessDetector>,
    pub jwt_service: Arc<JwtService>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::build(TestDependencies::new(), fast_staleness_config())
    }

    pub fn with_worker(worker: MockCrawlWorker) -> Self {
        Self::build(
            TestDependencies::new().mock_worker(worker),
            fast_staleness_config(),
        )
    }

    pub fn with_probe(probe: MockSiteProbe, staleness: StalenessConfig) -> Self {
        Self::build(TestDependencies::new().mock_probe(probe), staleness)
    }

    pub fn build(deps: TestDependencies, staleness: StalenessConfig) -> Self {
        init_tracing();

        let server_deps = deps.into_server_deps();
        let lifecycle = server_deps.lifecycle(LifecycleConfig::default());
        let detector = Arc::new(server_deps.staleness_detector(staleness));

        Self {
            deps,
            lifecycle,
            detector,
            jwt_service: Arc::new(JwtService::new(JWT_SECRET, JWT_ISSUER.to_string())),
        }
    }

    pub fn app(&self) -> Router {
        let state = AxumAppState {
            store: self.deps.store.clone(),
            lifecycle: self.lifecycle.clone(),
            detector: self.detector.clone(),
            jwt_service: self.jwt_service.clone(),
            cron_secret: Arc::from(CRON_SECRET),
            poller_config: PollerConfig::default(),
        };
        build_app(state, &[])
    }

    pub fn token_for(&self, owner_id: OwnerId) -> String {
        self.jwt_service
            .create_token(owner_id, chrono::Duration::hours(1))
            .expect("Failed to issue test token")
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().expect("Stub server has no address");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Stub server failed");
    });

    format!("http://{}", addr)
}

/// Wait until `condition` holds, yielding to background tasks in between.
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..3000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for: {}", what);
}
