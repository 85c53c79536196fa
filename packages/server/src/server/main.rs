// Main entry point for the crawl tracker API server

use std::sync::Arc;

use anyhow::{Context, Result};
use crawl_tracker_core::{
    domains::auth::JwtService,
    domains::crawl_jobs::{JobView, PostgresCrawlJobStore, ReconciliationPoller, ViewScope},
    kernel::{start_scheduler, CrawlWorkerClient, HttpSiteProbe, ServerDeps},
    server::{build_app, AxumAppState},
    Config,
};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,crawl_tracker_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Crawl Tracker API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // External collaborators
    let deps = ServerDeps::new(
        Arc::new(PostgresCrawlJobStore::new(pool)),
        Arc::new(
            CrawlWorkerClient::new(config.worker_client_config())
                .context("Failed to create crawl worker client")?,
        ),
        Arc::new(
            HttpSiteProbe::new(config.probe_timeout).context("Failed to create site probe")?,
        ),
    );

    let lifecycle = deps.lifecycle(config.lifecycle_config());
    let detector = Arc::new(deps.staleness_detector(config.staleness_config()));
    let shutdown = CancellationToken::new();

    // System-wide reconciliation so jobs settle even with no client watching
    let reconciler = if config.server_reconciler {
        let view = Arc::new(JobView::new(ViewScope::AllOwners, deps.store.clone()));
        let poller = ReconciliationPoller::new(lifecycle.clone(), view, config.poller_config());
        Some(tokio::spawn(poller.run(shutdown.clone())))
    } else {
        tracing::info!("Server-side reconciliation disabled");
        None
    };

    // Optional in-process staleness schedule
    let scheduler = match config.staleness_cron.as_deref() {
        Some(cron) => Some(
            start_scheduler(detector.clone(), cron)
                .await
                .context("Failed to start staleness scheduler")?,
        ),
        None => None,
    };

    let app = build_app(
        AxumAppState {
            store: deps.store.clone(),
            lifecycle,
            detector,
            jwt_service: Arc::new(JwtService::new(
                &config.jwt_secret,
                config.jwt_issuer.clone(),
            )),
            cron_secret: Arc::from(config.cron_secret.as_str()),
            poller_config: config.poller_config(),
        },
        &config.allowed_origins,
    );

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let shutdown_signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown_signal.cancel();
    })
    .await
    .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = reconciler {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Reconciliation poller task failed");
        }
    }
    if let Some(mut scheduler) = scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::error!(error = %e, "Failed to stop staleness scheduler");
        }
    }

    Ok(())
}
