//! Container lifecycle and aggregated logs.

use std::sync::Arc;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::ContainerError;

/// Wraps `make down`, `make up` and `docker compose logs`.
#[derive(Clone)]
pub struct ContainerControl {
    commands: Arc<dyn CommandRunner>,
}

impl ContainerControl {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }

    /// Stop every container.
    ///
    /// # Errors
    ///
    /// [`ContainerError::Stop`] carrying stderr on a non-zero exit.
    pub async fn down(&self) -> Result<(), ContainerError> {
        let out = self.commands.run(&CommandSpec::make("down"), None).await?;
        if !out.success() {
            return Err(ContainerError::Stop { stderr: out.stderr });
        }
        tracing::info!("containers stopped");
        Ok(())
    }

    /// Start every container.
    ///
    /// # Errors
    ///
    /// [`ContainerError::Start`] carrying stderr on a non-zero exit.
    pub async fn up(&self) -> Result<(), ContainerError> {
        let out = self.commands.run(&CommandSpec::make("up"), None).await?;
        if !out.success() {
            return Err(ContainerError::Start { stderr: out.stderr });
        }
        tracing::info!("containers started");
        Ok(())
    }

    /// `down` then `up`.
    ///
    /// # Errors
    ///
    /// The first failure; `up` is not attempted if `down` fails.
    pub async fn restart(&self) -> Result<(), ContainerError> {
        self.down().await?;
        self.up().await
    }

    /// Output of `docker compose logs`: stdout, or stderr when stdout is
    /// empty. Never fails; a spawn error becomes the returned text.
    pub async fn logs(&self) -> String {
        let spec = CommandSpec::new("docker", ["compose", "logs"]);
        match self.commands.run(&spec, None).await {
            Ok(out) if !out.stdout.is_empty() => out.stdout,
            Ok(out) => out.stderr,
            Err(e) => {
                tracing::warn!(error = %e, "docker compose logs failed");
                format!("Failed to fetch docker compose logs: {e}")
            }
        }
    }
}

impl std::fmt::Debug for ContainerControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerControl").finish_non_exhaustive()
    }
}
