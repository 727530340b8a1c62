use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vin_lookup::{
    start_api_server, AppState, CarImageryClient, Config, LookupOrchestrator, RecordStore,
    SqliteRecordStore, VpicClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting VIN lookup service"
    );

    if config.service.metrics_enabled {
        init_metrics(config.service.metrics_port)?;
    }

    let record_store = SqliteRecordStore::new(&config.database)
        .await
        .context("Failed to initialize record store")?;

    if config.database.run_migrations {
        record_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    if config.database.reset_on_startup {
        let cleared = record_store
            .clear()
            .await
            .context("Failed to reset record store")?;
        if cleared > 0 {
            warn!(deleted_count = cleared, "Discarded cached VIN records from a previous run");
        }
    }

    let store: Arc<dyn RecordStore> = Arc::new(record_store);

    let decoder = VpicClient::new(&config.decode_provider)
        .context("Failed to initialize decode provider client")?;
    let photos = CarImageryClient::new(&config.photo_provider)
        .context("Failed to initialize photo provider client")?;

    let orchestrator = Arc::new(LookupOrchestrator::new(
        store.clone(),
        Arc::new(decoder),
        Arc::new(photos),
    ));

    let api_state = AppState {
        orchestrator,
        store,
        service_name: config.service.name.clone(),
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("VIN lookup service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down VIN lookup service");

    api_handle.abort();

    info!("VIN lookup service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
