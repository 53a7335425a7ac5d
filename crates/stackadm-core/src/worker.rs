//! Single-writer setup worker.
//!
//! While the server runs, one task owns the setup state. Request handlers
//! talk to it through a [`SetupHandle`]: they send intents over an mpsc
//! channel and read snapshots from a watch channel. The worker applies
//! intents in arrival order and runs the next requested step on every tick,
//! so no two writers ever race on the state file.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::SetupError;
use crate::runner::{InitialSettings, StepRun, StepRunner};
use crate::state::{RestoreBackup, SetupState};
use crate::step::StepId;

const COMMAND_BUFFER: usize = 32;

/// An intent sent to the worker.
#[derive(Debug)]
pub enum SetupCommand {
    /// Move a pending step to `requested`. Replies whether it moved.
    Request {
        step: StepId,
        reply: oneshot::Sender<Result<bool, SetupError>>,
    },
    /// Run `generate_env` with the operator's settings.
    InitialSettings {
        settings: InitialSettings,
        restore: RestoreBackup,
        reply: oneshot::Sender<Result<StepRun, SetupError>>,
    },
}

/// Cloneable client side of the worker.
#[derive(Debug, Clone)]
pub struct SetupHandle {
    tx: mpsc::Sender<SetupCommand>,
    state: watch::Receiver<SetupState>,
}

impl SetupHandle {
    /// The latest persisted state.
    pub fn snapshot(&self) -> SetupState {
        self.state.borrow().clone()
    }

    /// A receiver notified on every persisted transition.
    pub fn subscribe(&self) -> watch::Receiver<SetupState> {
        self.state.clone()
    }

    /// Ask the worker to request `step`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::WorkerUnavailable`] if the worker has stopped,
    /// or the error the worker hit while saving.
    pub async fn request(&self, step: StepId) -> Result<bool, SetupError> {
        let (reply, rx) = oneshot::channel();
        self.send(SetupCommand::Request { step, reply }).await?;
        rx.await.map_err(|_| SetupError::WorkerUnavailable)?
    }

    /// Hand the initial settings to the worker and wait for `generate_env`
    /// to finish.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::WorkerUnavailable`] if the worker has stopped,
    /// or whatever [`StepRunner::run_initial_settings`] returned.
    pub async fn submit_initial_settings(
        &self,
        settings: InitialSettings,
        restore: RestoreBackup,
    ) -> Result<StepRun, SetupError> {
        let (reply, rx) = oneshot::channel();
        self.send(SetupCommand::InitialSettings {
            settings,
            restore,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SetupError::WorkerUnavailable)?
    }

    async fn send(&self, cmd: SetupCommand) -> Result<(), SetupError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SetupError::WorkerUnavailable)
    }
}

/// The task owning all setup transitions.
pub struct SetupWorker {
    runner: StepRunner,
    state: SetupState,
    commands: mpsc::Receiver<SetupCommand>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SetupWorker {
    /// Spawn the worker on the current runtime.
    ///
    /// `initial` is the state loaded at startup. The first tick fires one
    /// `period` after start. The task exits when `shutdown` changes or every
    /// handle is dropped.
    pub fn start(
        runner: StepRunner,
        initial: SetupState,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> (SetupHandle, JoinHandle<()>) {
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);

        let worker = Self {
            runner: runner.with_publisher(state_tx),
            state: initial,
            commands,
            period,
            shutdown,
        };
        let task = tokio::spawn(worker.run());

        (
            SetupHandle {
                tx,
                state: state_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        let mut tick = tokio::time::interval_at(Instant::now() + self.period, self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.period.as_secs(), "setup worker started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        tracing::info!("all setup handles dropped, worker exiting");
                        return;
                    };
                    self.handle(cmd).await;
                }
                _ = tick.tick() => self.tick().await,
                _ = self.shutdown.changed() => {
                    tracing::info!("setup worker shutting down");
                    return;
                }
            }
        }
    }

    /// Pick up transitions written by `stackadm run-step`.
    async fn refresh(&mut self) {
        if let Err(e) = self.runner.refresh(&mut self.state).await {
            tracing::warn!(error = %e, "failed to re-read setup state, keeping the last known one");
        }
    }

    async fn handle(&mut self, cmd: SetupCommand) {
        self.refresh().await;
        match cmd {
            SetupCommand::Request { step, reply } => {
                let result = self.runner.request_step(&mut self.state, step).await;
                if let Err(e) = &result {
                    tracing::error!(%step, error = %e, "failed to request step");
                }
                let _ = reply.send(result);
            }
            SetupCommand::InitialSettings {
                settings,
                restore,
                reply,
            } => {
                let result = self
                    .runner
                    .run_initial_settings(&mut self.state, &settings, restore)
                    .await;
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "initial settings rejected");
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn tick(&mut self) {
        self.refresh().await;
        if let Err(e) = self.runner.run_pending_step(&mut self.state).await {
            tracing::error!(error = %e, "setup step run failed");
        }
    }
}

impl std::fmt::Debug for SetupWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupWorker")
            .field("period", &self.period)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
