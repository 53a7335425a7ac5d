//! Step execution and status transitions.
//!
//! [`StepRunner`] is the only code that moves a step out of `requested` or
//! runs a step command. Inside the server it is owned by the setup worker;
//! `stackadm run-step` drives it directly for one pass.
//!
//! Transitions:
//!
//! ```text
//! pending ──request──▶ requested ──tick──▶ in_progress ──exit 0──▶ done
//!                                                     └─exit ≠ 0─▶ failed
//! ```
//!
//! After `done` the following step, if still pending, is requested so the
//! next tick picks it up. A failed step stops the sequence. After the
//! terminal step the autostart hooks are removed whatever the outcome.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::autostart::Autostart;
use crate::command::CommandRunner;
use crate::error::SetupError;
use crate::setup_log::SetupLog;
use crate::state::{RestoreBackup, SetupState, SetupStore};
use crate::step::{StepId, StepStatus};

/// Operator input for the `generate_env` step.
#[derive(Clone, PartialEq, Eq)]
pub struct InitialSettings {
    pub domain: String,
    pub auth_domain: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl InitialSettings {
    /// Reject empty fields and anything that would break the line-based
    /// stdin protocol of `make generate-env`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidInput`] naming the offending field.
    pub fn validate(&self) -> Result<(), SetupError> {
        let fields = [
            ("DOMAIN", &self.domain),
            ("AUTH_DOMAIN", &self.auth_domain),
            ("ADMIN_USERNAME", &self.admin_username),
            ("ADMIN_PASSWORD", &self.admin_password),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(SetupError::InvalidInput {
                    reason: format!("{name} is required"),
                });
            }
            if value.contains(['\n', '\r']) {
                return Err(SetupError::InvalidInput {
                    reason: format!("{name} must be a single line"),
                });
            }
        }
        Ok(())
    }

    /// Answers for the interactive `generate-env` prompt, in prompt order.
    pub fn stdin_script(&self) -> String {
        format!(
            "P\n{}\n{}\n{}\n{}\n",
            self.domain.trim(),
            self.auth_domain.trim(),
            self.admin_username.trim(),
            self.admin_password
        )
    }
}

impl fmt::Debug for InitialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialSettings")
            .field("domain", &self.domain)
            .field("auth_domain", &self.auth_domain)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"[REDACTED]")
            .finish()
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRun {
    pub step: StepId,
    /// `done` or `failed`.
    pub status: StepStatus,
    /// The step moved to `requested` as a result, if any.
    pub advanced: Option<StepId>,
}

/// Executes setup steps and persists every transition.
#[derive(Clone)]
pub struct StepRunner {
    states: SetupStore,
    log: SetupLog,
    commands: Arc<dyn CommandRunner>,
    autostart: Option<Autostart>,
    publisher: Option<watch::Sender<SetupState>>,
}

impl StepRunner {
    pub fn new(states: SetupStore, log: SetupLog, commands: Arc<dyn CommandRunner>) -> Self {
        Self {
            states,
            log,
            commands,
            autostart: None,
            publisher: None,
        }
    }

    /// Remove the autostart hooks after the terminal step.
    #[must_use]
    pub fn with_autostart(mut self, autostart: Autostart) -> Self {
        self.autostart = Some(autostart);
        self
    }

    /// Publish every persisted state on `tx`.
    #[must_use]
    pub fn with_publisher(mut self, tx: watch::Sender<SetupState>) -> Self {
        self.publisher = Some(tx);
        self
    }

    pub fn states(&self) -> &SetupStore {
        &self.states
    }

    pub fn log(&self) -> &SetupLog {
        &self.log
    }

    async fn persist(&self, state: &SetupState) -> Result<(), SetupError> {
        self.states.save(state).await?;
        self.publish(state);
        Ok(())
    }

    fn publish(&self, state: &SetupState) {
        if let Some(tx) = &self.publisher {
            tx.send_replace(state.clone());
        }
    }

    /// Replace `state` with what is on disk.
    ///
    /// `stackadm run-step` may have moved the sequence on since `state` was
    /// last saved; the file wins.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the state cannot be loaded; `state` is left
    /// untouched in that case.
    pub async fn refresh(&self, state: &mut SetupState) -> Result<(), SetupError> {
        let fresh = self.states.load().await?;
        if fresh != *state {
            tracing::info!("setup state changed on disk, adopting it");
            *state = fresh;
            self.publish(state);
        }
        Ok(())
    }

    /// Move `step` from `pending` to `requested` and persist.
    ///
    /// Returns `false` without writing anything if the step is not pending.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the state cannot be saved.
    pub async fn request_step(
        &self,
        state: &mut SetupState,
        step: StepId,
    ) -> Result<bool, SetupError> {
        if !state.request(step) {
            tracing::debug!(%step, status = %state.status(step), "step not pending, request ignored");
            return Ok(false);
        }
        self.persist(state).await?;
        tracing::info!(%step, "step requested");
        Ok(true)
    }

    /// Execute the first `requested` step, if there is one.
    ///
    /// Returns `Ok(None)` without running or writing anything when no step is
    /// requested. A failing command is not an error: it yields a
    /// [`StepRun`] with status `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the state cannot be written. A log write
    /// failure is only logged.
    pub async fn run_pending_step(
        &self,
        state: &mut SetupState,
    ) -> Result<Option<StepRun>, SetupError> {
        let Some(step) = state.first_with(StepStatus::Requested) else {
            return Ok(None);
        };

        state.set(step, StepStatus::InProgress);
        self.persist(state).await?;

        let status = self.execute(step, None).await;
        state.set(step, status);
        self.persist(state).await?;

        self.finish(state, step, status).await.map(Some)
    }

    /// Run `generate_env` with the operator's settings fed on stdin.
    ///
    /// The step goes `pending → in_progress → done | failed`. The
    /// `restore_backup` choice is recorded in the state before the command
    /// runs so the provisioning scripts can read it.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::InvalidInput`] for bad settings,
    /// [`SetupError::NotPending`] if `generate_env` already ran, or a storage
    /// error.
    pub async fn run_initial_settings(
        &self,
        state: &mut SetupState,
        settings: &InitialSettings,
        restore: RestoreBackup,
    ) -> Result<StepRun, SetupError> {
        let step = StepId::GenerateEnv;
        settings.validate()?;

        let current = state.status(step);
        if current != StepStatus::Pending {
            return Err(SetupError::NotPending {
                step,
                status: current,
            });
        }

        state.set_restore_backup(restore);
        state.set(step, StepStatus::InProgress);
        self.persist(state).await?;

        let status = self.execute(step, Some(&settings.stdin_script())).await;
        state.set(step, status);
        self.persist(state).await?;

        self.finish(state, step, status).await
    }

    async fn execute(&self, step: StepId, stdin: Option<&str>) -> StepStatus {
        let command = step.command();
        tracing::info!(%step, %command, "running setup step");

        let (status, stdout, stderr) = match self.commands.run(&command, stdin).await {
            Ok(out) if out.success() => (StepStatus::Done, out.stdout, out.stderr),
            Ok(out) => {
                tracing::warn!(%step, exit_code = out.exit_code, "setup step failed");
                (StepStatus::Failed, out.stdout, out.stderr)
            }
            Err(e) => {
                tracing::warn!(%step, error = %e, "setup step could not be started");
                (StepStatus::Failed, String::new(), e.to_string())
            }
        };

        // The outcome is persisted even when the log cannot be written.
        if let Err(e) = self.log.append(step.title(), &stdout, &stderr).await {
            tracing::warn!(%step, error = %e, "failed to append setup log");
        }
        status
    }

    async fn finish(
        &self,
        state: &mut SetupState,
        step: StepId,
        status: StepStatus,
    ) -> Result<StepRun, SetupError> {
        if step.is_terminal() {
            if let Some(autostart) = &self.autostart {
                autostart.disable().await;
            }
        }

        let mut advanced = None;
        if status == StepStatus::Done {
            if let Some(next) = step.next() {
                if state.request(next) {
                    self.persist(state).await?;
                    advanced = Some(next);
                }
            }
        }

        tracing::info!(
            %step,
            %status,
            next = advanced.map(StepId::as_str),
            "setup step finished"
        );
        Ok(StepRun {
            step,
            status,
            advanced,
        })
    }
}

impl fmt::Debug for StepRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRunner")
            .field("states", &self.states)
            .field("log", &self.log)
            .field("autostart", &self.autostart)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use stackadm_storage::{DocumentStore, MemoryStore, StorageError};

    use super::*;
    use crate::command::ScriptedRunner;

    struct Harness {
        runner: StepRunner,
        commands: ScriptedRunner,
        store: MemoryStore,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let shared: Arc<MemoryStore> = Arc::new(store.clone());
        let commands = ScriptedRunner::new();
        let runner = StepRunner::new(
            SetupStore::new(shared.clone(), "state.json"),
            SetupLog::new(shared, "log.txt"),
            Arc::new(commands.clone()),
        );
        Harness {
            runner,
            commands,
            store,
        }
    }

    fn settings() -> InitialSettings {
        InitialSettings {
            domain: "app.example.com".to_owned(),
            auth_domain: "auth.example.com".to_owned(),
            admin_username: "admin".to_owned(),
            admin_password: "s3cret".to_owned(),
        }
    }

    async fn persisted(h: &Harness) -> SetupState {
        h.runner.states().load().await.unwrap()
    }

    #[tokio::test]
    async fn nothing_requested_runs_nothing() {
        let h = harness();
        let mut state = SetupState::initial();

        let run = h.runner.run_pending_step(&mut state).await.unwrap();

        assert!(run.is_none());
        assert_eq!(state, SetupState::initial());
        assert!(h.commands.calls().is_empty());
        assert!(h.store.read("state.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn success_advances_next_pending_step() {
        let h = harness();
        h.commands.succeed("make init-cert", "certificate issued\n");
        let mut state = SetupState::initial();
        state.set(StepId::GenerateEnv, StepStatus::Done);
        state.set(StepId::InitCert, StepStatus::Requested);

        let run = h.runner.run_pending_step(&mut state).await.unwrap().unwrap();

        assert_eq!(run.step, StepId::InitCert);
        assert_eq!(run.status, StepStatus::Done);
        assert_eq!(run.advanced, Some(StepId::InitKeycloak));
        assert_eq!(h.commands.commands(), vec!["make init-cert"]);
        let saved = persisted(&h).await;
        assert_eq!(saved.status(StepId::InitCert), StepStatus::Done);
        assert_eq!(saved.status(StepId::InitKeycloak), StepStatus::Requested);
        assert_eq!(
            h.runner.log().read().await.unwrap(),
            "\n\n### Request Certificates\ncertificate issued\n"
        );
    }

    #[tokio::test]
    async fn failure_stops_the_sequence() {
        let h = harness();
        h.commands.fail("make init-keycloak", "realm import failed\n");
        let mut state = SetupState::initial();
        state.set(StepId::GenerateEnv, StepStatus::Done);
        state.set(StepId::InitCert, StepStatus::Done);
        state.set(StepId::InitKeycloak, StepStatus::Requested);

        let run = h.runner.run_pending_step(&mut state).await.unwrap().unwrap();

        assert_eq!(run.status, StepStatus::Failed);
        assert_eq!(run.advanced, None);
        assert_eq!(state.status(StepId::DockerUp), StepStatus::Pending);
        assert!(h.runner.log().read().await.unwrap().contains("realm import failed"));
    }

    #[tokio::test]
    async fn spawn_error_marks_step_failed_and_logs_it() {
        let h = harness();
        h.commands.spawn_error("make");
        let mut state = SetupState::initial();
        state.set(StepId::InitCert, StepStatus::Requested);

        let run = h.runner.run_pending_step(&mut state).await.unwrap().unwrap();

        assert_eq!(run.status, StepStatus::Failed);
        let log = h.runner.log().read().await.unwrap();
        assert!(log.contains("### Request Certificates\nfailed to run 'make init-cert'"));
    }

    /// A log backend whose appends always fail.
    struct FullDisk;

    #[async_trait::async_trait]
    impl DocumentStore for FullDisk {
        async fn read(&self, _name: &str) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(None)
        }

        async fn write(&self, _name: &str, _data: &[u8]) -> Result<(), StorageError> {
            Ok(())
        }

        async fn append(&self, name: &str, _data: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Write {
                name: name.to_owned(),
                reason: "no space left on device".to_owned(),
            })
        }

        async fn remove(&self, _name: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn log_write_failure_still_settles_the_step() {
        let h = harness();
        h.commands.succeed("make init-cert", "certificate issued\n");
        let runner = StepRunner::new(
            h.runner.states().clone(),
            SetupLog::new(Arc::new(FullDisk), "log.txt"),
            Arc::new(h.commands.clone()),
        );
        let mut state = SetupState::initial();
        state.set(StepId::GenerateEnv, StepStatus::Done);
        state.set(StepId::InitCert, StepStatus::Requested);

        let run = runner.run_pending_step(&mut state).await.unwrap().unwrap();

        assert_eq!(run.status, StepStatus::Done);
        let saved = persisted(&h).await;
        assert_eq!(saved.status(StepId::InitCert), StepStatus::Done);
        assert_eq!(saved.status(StepId::InitKeycloak), StepStatus::Requested);
    }

    #[tokio::test]
    async fn refresh_adopts_the_file() {
        let h = harness();
        let (tx, rx) = watch::channel(SetupState::initial());
        let runner = h.runner.clone().with_publisher(tx);
        h.store
            .write(
                "state.json",
                br#"{"generate_env":"done","init_cert":"done","init_keycloak":"requested","docker_up":"pending"}"#,
            )
            .await
            .unwrap();
        let mut state = SetupState::initial();
        state.set(StepId::GenerateEnv, StepStatus::Done);
        state.set(StepId::InitCert, StepStatus::Requested);

        runner.refresh(&mut state).await.unwrap();

        assert_eq!(state.status(StepId::InitCert), StepStatus::Done);
        assert_eq!(state.first_with(StepStatus::Requested), Some(StepId::InitKeycloak));
        assert_eq!(*rx.borrow(), state);
    }

    #[tokio::test]
    async fn terminal_step_disables_autostart_and_advances_nothing() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let runner = h
            .runner
            .clone()
            .with_autostart(Autostart::new(Arc::new(h.commands.clone()), "init-setup").with_unit_dir(dir.path()));
        let mut state = SetupState::initial();
        for id in [StepId::GenerateEnv, StepId::InitCert, StepId::InitKeycloak] {
            state.set(id, StepStatus::Done);
        }
        state.set(StepId::DockerUp, StepStatus::Requested);

        let run = runner.run_pending_step(&mut state).await.unwrap().unwrap();

        assert_eq!(run.advanced, None);
        assert!(state.is_complete());
        let cmds = h.commands.commands();
        assert_eq!(cmds[0], "make up");
        assert!(cmds.contains(&"systemctl disable init-setup".to_owned()));
    }

    #[tokio::test]
    async fn request_step_only_touches_pending() {
        let h = harness();
        let mut state = SetupState::initial();
        state.set(StepId::InitCert, StepStatus::Failed);

        assert!(!h.runner.request_step(&mut state, StepId::InitCert).await.unwrap());
        assert!(h.store.read("state.json").await.unwrap().is_none());

        assert!(h.runner.request_step(&mut state, StepId::DockerUp).await.unwrap());
        assert_eq!(persisted(&h).await.status(StepId::DockerUp), StepStatus::Requested);
    }

    #[tokio::test]
    async fn initial_settings_feed_stdin_and_request_next_step() {
        let h = harness();
        let mut state = SetupState::initial();

        let run = h
            .runner
            .run_initial_settings(&mut state, &settings(), RestoreBackup::Skip)
            .await
            .unwrap();

        assert_eq!(run.status, StepStatus::Done);
        assert_eq!(run.advanced, Some(StepId::InitCert));
        let calls = h.commands.calls();
        assert_eq!(calls[0].command, "make generate-env");
        assert_eq!(
            calls[0].stdin.as_deref(),
            Some("P\napp.example.com\nauth.example.com\nadmin\ns3cret\n")
        );
        let saved = persisted(&h).await;
        assert_eq!(saved.restore_backup(), Some(RestoreBackup::Skip));
        assert_eq!(saved.status(StepId::InitCert), StepStatus::Requested);
    }

    #[tokio::test]
    async fn initial_settings_rejected_once_generate_env_ran() {
        let h = harness();
        let mut state = SetupState::initial();
        state.set(StepId::GenerateEnv, StepStatus::Failed);

        let err = h
            .runner
            .run_initial_settings(&mut state, &settings(), RestoreBackup::Skip)
            .await
            .unwrap_err();

        assert!(matches!(err, SetupError::NotPending { .. }));
        assert!(h.commands.calls().is_empty());
    }

    #[test]
    fn settings_validation() {
        let mut s = settings();
        assert!(s.validate().is_ok());
        s.domain = "  ".to_owned();
        assert!(matches!(s.validate(), Err(SetupError::InvalidInput { .. })));
        s = settings();
        s.admin_password = "a\nb".to_owned();
        assert!(s.validate().is_err());
    }

    #[test]
    fn settings_debug_redacts_password() {
        let out = format!("{:?}", settings());
        assert!(!out.contains("s3cret"));
        assert!(out.contains("REDACTED"));
    }

    #[tokio::test]
    async fn publisher_sees_every_transition() {
        let h = harness();
        let (tx, mut rx) = watch::channel(SetupState::initial());
        let runner = h.runner.clone().with_publisher(tx);
        let mut state = SetupState::initial();
        state.set(StepId::InitCert, StepStatus::Requested);

        runner.run_pending_step(&mut state).await.unwrap();

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen, state);
    }
}
