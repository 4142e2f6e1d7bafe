// BSD 3-Clause License
// Copyright (c) 2025, Shipyard Contributors
//
//! Bay entry point: wires configuration, the Container Driver, the Ship
//! Repository, Recovery, and the Scheduler/Reaper/Router trio behind the
//! HTTP Front, grounded in the teacher's `main()` initialization sequence.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use shipyard::affinity::AffinityIndex;
use shipyard::capacity::Capacity;
use shipyard::config::Config;
use shipyard::driver::DockerDriver;
use shipyard::health::HealthProber;
use shipyard::http;
use shipyard::reaper::Reaper;
use shipyard::repository::{self, PostgresRepository, ShipRepository};
use shipyard::router::OperationRouter;
use shipyard::scheduler::Scheduler;
use shipyard::{recovery, ShipyardError};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shipyard=info,tower_http=info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false);
    if std::env::var("SHIPYARD_JSON_LOGS").map(|v| v != "false").unwrap_or(true) {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    dotenvy::dotenv().ok();

    let config = Config::from_env().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    info!(host = %config.server.host, port = config.server.port, "Bay starting");

    let driver: Arc<dyn shipyard::driver::ContainerDriver> = Arc::new(
        DockerDriver::connect(config.driver.docker_image.clone(), config.driver.docker_network.clone())
            .await
            .context("connecting to the container runtime")?,
    );
    info!("container driver connected");

    let database_url = config
        .repository
        .database_url
        .clone()
        .context("DATABASE_URL is required")?;
    let pool = repository::init_pool(&database_url).await.context("connecting to the database")?;
    repository::run_migrations(&pool).await.context("running database migrations")?;
    let repository: Arc<dyn ShipRepository> = Arc::new(PostgresRepository::new(pool));
    info!("ship repository ready");

    let capacity = Arc::new(Capacity::new(config.fleet.max_ship_num, config.fleet.behavior_after_max_ship));
    let affinity = Arc::new(AffinityIndex::new(repository.clone()));

    let report = recovery::recover(&driver, &repository, &affinity, &capacity)
        .await
        .context("running boot recovery")?;
    info!(
        restored_running = report.restored_running,
        marked_stopped = report.marked_stopped,
        "recovery complete"
    );

    let prober = Arc::new(HealthProber::new(
        reqwest::Client::new(),
        Duration::from_secs(config.fleet.ship_health_check_interval_secs),
        Duration::from_secs(config.fleet.ship_health_check_timeout_secs),
    ));

    let scheduler = Arc::new(Scheduler::new(
        capacity.clone(),
        driver.clone(),
        repository.clone(),
        affinity.clone(),
        prober,
        Duration::from_secs(config.fleet.ship_health_check_timeout_secs),
    ));

    let reaper = Arc::new(Reaper::new(
        driver.clone(),
        repository.clone(),
        affinity.clone(),
        capacity.clone(),
        Duration::from_secs(config.fleet.ttl_reaper_scan_interval_secs),
    ));

    let router = Arc::new(OperationRouter::new(
        reqwest::Client::builder()
            .build()
            .context("building the upstream HTTP client")?,
        repository.clone(),
        affinity.clone(),
        Duration::from_secs(config.server.upstream_request_timeout_secs),
        config.security.clone(),
    ));

    let reaper_cancel = CancellationToken::new();
    let reaper_task = {
        let reaper = reaper.clone();
        let cancel = reaper_cancel.clone();
        tokio::spawn(async move { reaper.run(cancel).await })
    };

    let state = http::AppState {
        config: Arc::new(config.clone()),
        scheduler,
        reaper,
        router,
        affinity,
        capacity,
        driver,
        repository,
    };

    let app = http::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    info!(%addr, "Bay ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ShipyardError::Internal(e.to_string()))
        .context("server error")?;

    reaper_cancel.cancel();
    if let Err(e) = reaper_task.await {
        error!(error = %e, "reaper task panicked");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
