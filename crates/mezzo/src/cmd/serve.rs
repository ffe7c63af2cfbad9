//! The `serve` command: run the bus until interrupted.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use mezzo_broker::Broker;
use mezzo_config::Config;
use mezzo_engine::{CollectorScheduler, Supervisor};
use mezzo_script::ScriptService;
use mezzo_store::Store;

pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let _log_guard = crate::logging::init(&config.log_dir, config.log_level)?;
    info!(
        port = %config.port,
        db_path = %config.db_path,
        rabbitmq_dsn = %config.rabbitmq.dsn,
        "config loaded"
    );

    // The recorder has to exist before the first worker increments a
    // counter.
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    let store = Arc::new(Store::new(&config.db_path).await?);
    let broker = Arc::new(Broker::connect(&config.rabbitmq).await?);
    let scripts = Arc::new(ScriptService::new());

    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&broker),
        Arc::clone(&store),
        Arc::clone(&scripts),
    ));
    let scheduler = Arc::new(CollectorScheduler::new(
        Arc::clone(&store),
        Arc::clone(&scripts),
        Arc::clone(&broker),
    ));

    mezzo_engine::reconcile(&store, &broker, &supervisor, &scheduler).await;

    let app = Router::new()
        .route("/", get(root))
        .route("/metrics", get(render_metrics))
        .with_state(metrics_handle);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("shutting down workers");
    scheduler.stop_all();
    supervisor.stop_all();

    Ok(())
}

async fn root() -> &'static str {
    "mezzo service bus is running\n"
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
