use crate::config::Config;
use crate::server::HttpServer;

#[cfg(feature = "opencv")]
use crate::cascade::CascadeDetector;
use crate::detector::Detector;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

#[cfg(feature = "opencv")]
pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let detector = match CascadeDetector::new(&config.detector) {
        Ok(detector) => Arc::new(detector),
        Err(e) => {
            tracing::error!("Failed to initialize cascade detector: {:?}", e);
            return Err(Box::new(e));
        }
    };

    run_app(detector, config).await
}

/// Serves the relay with the given detector until Ctrl+C or SIGTERM.
pub async fn run_app(detector: Arc<dyn Detector>, config: Config) -> Result<(), Box<dyn Error>> {
    let server = HttpServer::new(detector, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(Err(e)) => tracing::error!("Server exited with error: {:?}", e),
        Err(e) => tracing::error!("Server task failed: {:?}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
