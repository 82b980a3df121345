//! Lockstep Server - Main entry point
//!
//! Hosts the job processor against the Redis lock quorum and serves the
//! status API until SIGINT/SIGTERM.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use lockstep_core::{
    api::{self, AppState},
    config::Config,
    jobs::builtin,
    lock::QuorumLockBackend,
    telemetry,
};

#[derive(Parser, Debug)]
#[command(name = "lockstep-server", version, about = "Lock-coordinated background job server")]
struct Args {
    /// Configuration file (toml, yaml or json)
    #[arg(short, long, env = "LOCKSTEP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    let metrics = telemetry::init_telemetry(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoints = ?config.lock.endpoints,
        "Starting Lockstep Server"
    );

    let backend = QuorumLockBackend::redis(&config.lock.endpoints)?
        .with_node_timeout(config.lock.node_timeout)
        .with_clock_drift_factor(config.lock.clock_drift_factor);
    tracing::info!(quorum = backend.quorum(), nodes = backend.nodes().len(), "Lock quorum configured");

    let processor = config.build_processor(Arc::new(backend));
    if let Err(e) = builtin::startup_check(processor.coordinator()).await {
        e.log();
    }
    let handle = processor.start();
    let scheduler = config.processor.builtin_jobs.then(|| {
        builtin::schedule(
            processor.clone(),
            config.processor.builtin_interval,
            handle.shutdown_token(),
        )
    });

    let mut state = AppState::new(processor);
    if let Some(metrics) = metrics {
        state = state.with_metrics(metrics);
    }
    let app = api::build_router(state);

    let addr = config.server.bind_address();
    tracing::info!(address = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.shutdown().await?;
    if let Some(scheduler) = scheduler {
        scheduler.await?;
    }
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
