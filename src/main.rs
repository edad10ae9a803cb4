use std::env;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clinicdb::api::RestApi;
use clinicdb::clinic::ClinicService;
use clinicdb::config::{load_config, DEFAULT_CONFIG_PATH};
use clinicdb::imagehost;
use clinicdb::storage::StorageEngine;

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, starting graceful shutdown"),
        _ = terminate => info!("SIGTERM received, starting graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("clinicdb=info,warp=info")),
        )
        .init();

    let config_path = env::var("CLINICDB_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = load_config(&config_path)?;
    info!(config = %config_path.display(), storage = %config.storage.path, "starting clinicdb");

    let storage = Arc::new(StorageEngine::new(&config)?);
    let images = imagehost::from_config(&config.image_host);

    let clinic = Arc::new(ClinicService::new(Arc::clone(&storage), images));
    let api = RestApi::new(clinic, config.api.max_upload_bytes);

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let (bound, server) = warp::serve(api.routes()).try_bind_with_graceful_shutdown(addr, async move {
        shutdown_rx.await.ok();
        info!("shutting down server");
    })?;
    info!(address = %bound, "server listening");

    let server_handle = tokio::spawn(server);

    shutdown_signal().await;
    shutdown_tx.send(()).ok();
    server_handle.await?;

    info!("flushing collections to disk");
    match storage.flush_all() {
        Ok(()) => info!("data flushed"),
        Err(e) => error!(error = %e, "failed to flush data"),
    }

    info!("server shutdown complete");
    Ok(())
}
