//! AgriSense Inference Server - HTTP API for crop and pest advisory

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod error;
mod state;

use agrisense_core::{Orchestrator, ServiceConfig};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agrisense_server=debug,agrisense_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AgriSense Inference Server");

    // Load configuration
    let config = ServiceConfig::default();
    info!("Prediction store: {:?}", config.data_dir);
    info!(
        "Worker: {} {:?}, inference API: {}",
        config.worker_command, config.worker_script, config.inference_api_url
    );

    // Create orchestrator
    let orchestrator = Orchestrator::new(&config)?;
    let state = AppState::new(orchestrator);

    info!("Orchestrator initialized");

    // Build router
    let app = api::create_router(state.clone());

    // Start server
    let host = std::env::var("AGRISENSE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = match std::env::var("AGRISENSE_PORT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid AGRISENSE_PORT='{}', falling back to 5000", raw);
                5000
            }
        },
        Err(_) => 5000,
    };
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    // Spawn server with graceful shutdown
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready. Press Ctrl+C to stop.");
    server.await?;

    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
