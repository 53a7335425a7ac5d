//! Shared application state for the `stackadm` server.
//!
//! A single [`AppState`] is built at startup and shared across all Axum
//! handlers via `Arc`. Setup state is only reachable through the worker
//! handle; everything else is a core service over the project directory.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use stackadm_core::autostart::Autostart;
use stackadm_core::backup::BackupManager;
use stackadm_core::command::CommandRunner;
use stackadm_core::containers::ContainerControl;
use stackadm_core::env::EnvFile;
use stackadm_core::keycloak::KeycloakCli;
use stackadm_core::layout::ProjectLayout;
use stackadm_core::runner::StepRunner;
use stackadm_core::setup_log::SetupLog;
use stackadm_core::state::SetupStore;
use stackadm_core::versions::{LatestVersionSource, VersionService};
use stackadm_core::worker::{SetupHandle, SetupWorker};
use stackadm_storage::DocumentStore;

use crate::middleware::SessionStore;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    pub layout: ProjectLayout,
    /// Client side of the setup worker.
    pub setup: SetupHandle,
    pub setup_log: SetupLog,
    /// Parsed `.env`, reloaded after `generate_env` and version updates.
    pub env: Arc<EnvFile>,
    pub backups: BackupManager,
    pub containers: ContainerControl,
    pub versions: VersionService,
    pub keycloak: KeycloakCli,
    pub sessions: SessionStore,
}

/// What [`AppState::start`] needs from the outside world.
pub struct StateOptions {
    pub layout: ProjectLayout,
    pub commands: Arc<dyn CommandRunner>,
    pub latest_versions: Arc<dyn LatestVersionSource>,
    pub runner_interval: Duration,
    pub autostart: Autostart,
}

impl AppState {
    /// Clear the setup log, load the setup state, spawn the setup worker
    /// and build every service.
    ///
    /// Returns the state and the worker task, which ends when `shutdown`
    /// changes.
    ///
    /// # Errors
    ///
    /// Fails if the setup log cannot be cleared or the state cannot be
    /// loaded. An unreadable `.env` is logged and treated as empty.
    pub async fn start(
        opts: StateOptions,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<(Arc<Self>, JoinHandle<()>)> {
        let StateOptions {
            layout,
            commands,
            latest_versions,
            runner_interval,
            autostart,
        } = opts;

        let store: Arc<dyn DocumentStore> = Arc::new(layout.store());
        let setup_log = SetupLog::new(Arc::clone(&store), ProjectLayout::SETUP_LOG);
        setup_log
            .clear()
            .await
            .context("failed to clear setup log")?;

        let states = SetupStore::new(store, ProjectLayout::STATE_FILE);
        let initial = states.load().await.context("failed to load setup state")?;

        let env = match EnvFile::load(layout.env_path()).await {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "env file is unreadable, starting without it");
                EnvFile::empty(layout.env_path())
            }
        };
        let env = Arc::new(env);

        let runner = StepRunner::new(states, setup_log.clone(), Arc::clone(&commands))
            .with_autostart(autostart);
        let (setup, worker) = SetupWorker::start(runner, initial, runner_interval, shutdown);

        let containers = ContainerControl::new(Arc::clone(&commands));
        let state = Self {
            setup,
            setup_log,
            backups: BackupManager::new(layout.backup_dir(), Arc::clone(&commands)),
            versions: VersionService::new(Arc::clone(&env), latest_versions, containers.clone()),
            keycloak: KeycloakCli::new(commands),
            containers,
            env,
            layout,
            sessions: SessionStore::new(),
        };

        Ok((Arc::new(state), worker))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
