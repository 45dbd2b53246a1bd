//! # olicense-exporter
//!
//! A Prometheus exporter for OLicense Server. It periodically runs the
//! server's status command (or reads a status file), normalizes the output,
//! and serves the result as metrics.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   raw text   ┌─────────┐  Snapshot  ┌───────────────┐
//! │   source   │─────────────▶│ Poller  │───────────▶│ SnapshotStore │
//! │ cmd | file │              │ (parse) │  publish   └───────┬───────┘
//! └────────────┘              └─────────┘                    │ current()
//!                                                            ▼
//!                                   GET /metrics ◀── PrometheusExporter
//! ```
//!
//! - **[`config`]**: layered settings (defaults, file, environment, flags)
//! - **[`source`]**: the command and file [`StatusSource`](olicense_pipeline::StatusSource)s
//! - [`olicense_status`] parses, [`olicense_pipeline`] polls, stores and serves
//!
//! ## Usage
//!
//! ```bash
//! # Run the status command every 15 seconds
//! olicense-exporter -- olicense-status --json
//!
//! # Read a file that a cron job keeps up to date
//! olicense-exporter --status-file /var/run/olicense/status.txt --poll-interval 60
//! ```

pub mod config;
pub mod logging;
pub mod source;

use std::sync::Arc;

use anyhow::{Context, Result};
use olicense_pipeline::prometheus::{PrometheusConfig, PrometheusExporter};
use olicense_pipeline::{Poller, SnapshotStore};
use tokio::sync::watch;

pub use config::{Args, ConfigError, ExporterConfig, StatusSourceConfig};
pub use source::{CommandSource, FileSource};

/// Serve metrics and poll until `shutdown` completes.
pub async fn run_until<F>(config: ExporterConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    let store = Arc::new(SnapshotStore::new());
    let source = source::from_config(&config.source);

    let exporter = PrometheusExporter::new(
        PrometheusConfig::builder()
            .listen_addr(config.listen_addr)
            .metrics_path(config.metrics_path.clone())
            .build(),
        store.clone(),
    );
    let (stop_tx, stop_rx) = watch::channel(false);
    let server = exporter
        .start_server(stop_rx)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_addr))?;

    let poller = Poller::builder(source.clone(), store)
        .interval(config.poll_interval)
        .fetch_timeout(config.command_timeout)
        .build()?
        .start();

    tracing::info!(
        source = source.description(),
        address = %server.local_addr(),
        "olicense-exporter started"
    );

    shutdown.await;
    tracing::info!("shutting down");

    if !poller.shutdown(config.command_timeout).await {
        tracing::warn!("status poller was aborted");
    }
    let _ = stop_tx.send(true);
    server.join().await;
    Ok(())
}

/// Serve metrics and poll until the process is asked to stop.
pub async fn run(config: ExporterConfig) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Completes on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
