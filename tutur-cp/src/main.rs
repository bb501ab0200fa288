//! Correction Pipeline (tutur-cp) - Main entry point
//!
//! HTTP service wrapping the adaptive correction pipeline: batch correction
//! API, job ingest, and the per-job SSE stream.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutur_cp::config::PipelineConfig;
use tutur_cp::pipeline::Pipeline;
use tutur_cp::{build_router, AppState};
use tutur_common::KvStore;

/// Interval between expired-entry purges of the KV store
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Command-line arguments for tutur-cp
#[derive(Parser, Debug)]
#[command(name = "tutur-cp")]
#[command(about = "Correction pipeline service for tutur")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5180", env = "TUTUR_CP_PORT")]
    port: u16,

    /// Folder for the service database
    #[arg(short, long, env = "TUTUR_DATA_FOLDER")]
    data_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutur_cp=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let data_folder = tutur_common::config::resolve_data_folder(
        args.data_folder.as_deref().and_then(|p| p.to_str()),
        "TUTUR_DATA_FOLDER",
    )
    .context("Failed to resolve data folder")?;

    info!("Starting tutur correction pipeline on port {}", args.port);
    info!("Data folder: {}", data_folder.display());

    let db_path = data_folder.join("tutur.db");
    let pool = tutur_common::kv::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    let kv = KvStore::new(pool);

    let pipeline = Arc::new(Pipeline::new(kv.clone(), PipelineConfig::from_env()));
    info!("Correction pipeline initialized");

    // Expired cache/counter entries are invisible to reads; this bounds
    // their disk footprint
    let purge_kv = kv.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purge_kv.purge_expired().await {
                Ok(0) => debug!("KV purge: nothing expired"),
                Ok(purged) => info!("KV purge removed {} expired entries", purged),
                Err(e) => warn!("KV purge failed: {}", e),
            }
        }
    });

    let app = build_router(AppState::new(kv, pipeline));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
