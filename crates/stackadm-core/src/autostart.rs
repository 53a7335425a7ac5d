//! Removal of the boot-time runner hooks once setup has finished.
//!
//! Deployments install a systemd unit and a cron entry that invoke
//! `stackadm run-step` until the sequence completes. After the terminal step
//! both are removed. Every stage is best-effort: failures are logged and the
//! next stage still runs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::command::{CommandRunner, CommandSpec};

/// Default systemd unit name.
pub const DEFAULT_UNIT: &str = "init-setup";
/// Where systemd unit files are installed.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";
/// Text identifying the runner's crontab line.
pub const CRON_MARKER: &str = "stackadm run-step";

#[derive(Clone)]
pub struct Autostart {
    commands: Arc<dyn CommandRunner>,
    unit: String,
    unit_dir: PathBuf,
}

impl Autostart {
    pub fn new(commands: Arc<dyn CommandRunner>, unit: impl Into<String>) -> Self {
        Self {
            commands,
            unit: unit.into(),
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
        }
    }

    /// Look for the unit file in `dir` instead of `/etc/systemd/system`.
    #[must_use]
    pub fn with_unit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.unit_dir = dir.into();
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Disable the unit, delete its file, reload systemd and drop the cron
    /// entry. Never fails.
    pub async fn disable(&self) {
        self.run_quietly(CommandSpec::new("systemctl", ["disable", self.unit.as_str()]))
            .await;

        let unit_file = self.unit_dir.join(format!("{}.service", self.unit));
        match tokio::fs::remove_file(&unit_file).await {
            Ok(()) => tracing::info!(path = %unit_file.display(), "removed autostart unit file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %unit_file.display(),
                error = %e,
                "failed to remove autostart unit file"
            ),
        }

        self.run_quietly(CommandSpec::new("systemctl", ["daemon-reload"]))
            .await;

        let script = format!("(crontab -l | grep -v '{CRON_MARKER}') | crontab -");
        self.run_quietly(CommandSpec::shell(&script)).await;

        tracing::info!(unit = %self.unit, "setup autostart disabled");
    }

    async fn run_quietly(&self, spec: CommandSpec) {
        match self.commands.run(&spec, None).await {
            Ok(out) if out.success() => {}
            Ok(out) => tracing::warn!(
                command = %spec,
                exit_code = out.exit_code,
                stderr = %out.stderr.trim(),
                "autostart cleanup command failed"
            ),
            Err(e) => tracing::warn!(command = %spec, error = %e, "autostart cleanup command failed"),
        }
    }
}

impl std::fmt::Debug for Autostart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autostart")
            .field("unit", &self.unit)
            .field("unit_dir", &self.unit_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::command::ScriptedRunner;

    #[tokio::test]
    async fn disable_runs_every_stage_and_removes_unit_file() {
        let dir = tempfile::tempdir().unwrap();
        let unit_file = dir.path().join("init-setup.service");
        std::fs::write(&unit_file, "[Unit]\n").unwrap();
        let runner = ScriptedRunner::new();

        Autostart::new(Arc::new(runner.clone()), DEFAULT_UNIT)
            .with_unit_dir(dir.path())
            .disable()
            .await;

        assert!(!unit_file.exists());
        let cmds = runner.commands();
        assert_eq!(cmds[0], "systemctl disable init-setup");
        assert_eq!(cmds[1], "systemctl daemon-reload");
        assert!(cmds[2].starts_with("sh -c (crontab -l | grep -v 'stackadm run-step')"));
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_stages() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new();
        runner.spawn_error("systemctl").fail("sh -c", "no crontab for root");

        Autostart::new(Arc::new(runner.clone()), "custom-unit")
            .with_unit_dir(dir.path())
            .disable()
            .await;

        assert_eq!(runner.commands().len(), 3);
    }
}
