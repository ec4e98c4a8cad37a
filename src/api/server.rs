use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use crate::agents::{AgentRegistry, LivenessSweeper};
use crate::config::{Config, ConfigHandle};
use crate::dispatch::{Dispatcher, OrphanReclaimer};
use crate::logs::LogBroker;
use crate::observability::Metrics;
use crate::queue::Queue;
use crate::store::Store;
use crate::webhook::WebhookTranslator;

use super::services;
use super::state::AppState;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Boots every component in dependency order and serves the `/v1/*` + `/health`
/// surface until a shutdown signal arrives.
///
/// `address` overrides `config.server.bind_addr` when given; `config_path`
/// selects the TOML file backing hot-reload (defaults to the
/// `DEPLOYBOT_CONFIG` env var / built-in default, see `config::sources`).
pub async fn run(address: Option<SocketAddr>, config_path: Option<PathBuf>, store_path: Option<PathBuf>) -> Result<(), AnyError> {
    info!("loading configuration");
    let config = match &config_path {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };

    let bind_addr = address.unwrap_or(config.server.bind_addr);
    let store_path = store_path.unwrap_or_else(|| config.server.store_path.clone());

    info!(path = %store_path.display(), "opening store");
    let store = Arc::new(Store::open(&store_path)?);

    info!("replaying durable state for crash recovery");
    let orphan_timeout = chrono::Duration::seconds(config.dispatch.running_job_orphan_timeout_secs);
    let report = store.recover(orphan_timeout, config.dispatch.t_stale_secs, config.dispatch.t_offline_secs)?;
    info!(
        requeued = report.requeued_pending.len(),
        reclaimed = report.reclaimed_orphans.len(),
        still_running = report.still_running.len(),
        "recovery complete"
    );

    let queue = Arc::new(Queue::new());
    queue.rebuild_from(&store.list_non_terminal_jobs()?);

    let metrics = Arc::new(Metrics::new());
    let log_broker = Arc::new(
        LogBroker::new(store.clone())
            .with_limits(config.logs.ring_capacity, config.logs.subscriber_backpressure_limit)
            .with_metrics(metrics.clone()),
    );
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue.clone(), log_broker.clone()));
    let agents = Arc::new(
        AgentRegistry::new(store.clone(), dispatcher.clone())
            .with_thresholds(config.dispatch.t_stale_secs, config.dispatch.t_offline_secs),
    );
    let webhook = Arc::new(WebhookTranslator::new(store.clone(), queue.clone()));

    let config_handle = ConfigHandle::new(config.clone(), config_path);

    LivenessSweeper::new(
        store.clone(),
        std::time::Duration::from_secs(config.dispatch.liveness_sweep_interval_secs),
        config.dispatch.t_stale_secs,
        config.dispatch.t_offline_secs,
    )
    .spawn();
    OrphanReclaimer::new(
        store.clone(),
        queue.clone(),
        std::time::Duration::from_secs(config.dispatch.reclaim_sweep_interval_secs),
        orphan_timeout,
        config.dispatch.t_stale_secs,
        config.dispatch.t_offline_secs,
    )
    .with_metrics(metrics.clone())
    .spawn();
    config_handle
        .clone()
        .spawn_watch(std::time::Duration::from_secs(config.dispatch.liveness_sweep_interval_secs));

    let state = AppState { config: config_handle, store, queue, dispatcher, agents, log_broker, webhook, metrics };

    let app = Router::new()
        .route("/v1/agents/register", post(services::register_agent))
        .route("/v1/agents/{agent_id}/heartbeat", post(services::heartbeat))
        .route("/v1/agents/{agent_id}/jobs/{job_id}", post(services::ack_job))
        .route("/v1/agents/{agent_id}/jobs/{job_id}/logs", post(services::post_logs))
        .route("/v1/jobs", post(services::create_job))
        .route("/v1/jobs/{job_id}", get(services::get_job))
        .route("/v1/jobs/{job_id}", delete(services::cancel_job))
        .route("/v1/jobs/{job_id}/logs/stream", get(services::stream_logs))
        .route("/v1/hosts", get(services::list_hosts))
        .route("/v1/webhooks/github", post(services::webhook_github))
        .route("/health", get(services::health))
        .with_state(state)
        .layer(RequestDecompressionLayer::new());

    let listener = TcpListener::bind(bind_addr).await?;
    info!(address = %bind_addr, "DeployBot listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
