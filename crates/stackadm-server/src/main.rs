//! `stackadm` server entry point.
//!
//! Loads configuration, spawns the setup worker over the project directory,
//! then serves the console with graceful shutdown. The worker is stopped
//! through the same shutdown signal as the listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use stackadm_core::autostart::Autostart;
use stackadm_core::command::{CommandRunner, SystemCommandRunner};
use stackadm_core::versions::HttpVersionSource;

use stackadm_server::build_router;
use stackadm_server::config::ServerConfig;
use stackadm_server::state::{AppState, StateOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(project_dir = %config.project_dir.display(), "stackadm starting");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let commands: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new(&config.project_dir));
    let latest_versions = Arc::new(
        HttpVersionSource::new(config.versions_url.clone(), config.versions_timeout())
            .context("failed to build versions API client")?,
    );
    let autostart = Autostart::new(Arc::clone(&commands), config.autostart_unit.clone());

    let opts = StateOptions {
        layout: config.layout(),
        commands,
        latest_versions,
        runner_interval: config.runner_interval(),
        autostart,
    };
    let (state, worker) = AppState::start(opts, shutdown_rx)
        .await
        .context("failed to initialize application state")?;

    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "stackadm server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("server error")?;

    // A step command in flight is not interrupted; give it a bounded wait.
    info!("waiting for setup worker to stop");
    if tokio::time::timeout(Duration::from_secs(10), worker).await.is_err() {
        tracing::warn!("setup worker did not stop within 10s");
    }

    info!("stackadm server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
