//! Error types for `stackadm-core`.
//!
//! Each error variant carries enough context to diagnose the problem from a
//! single log line. Messages that end up in operator-facing responses keep
//! the wording operators already know from the shell scripts
//! ("Failed to stop containers: ...").

use stackadm_storage::StorageError;

use crate::step::{StepId, StepStatus};

/// Errors from spawning or talking to an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The process could not be started (missing binary, bad working dir).
    #[error("failed to run '{command}': {reason}")]
    Spawn { command: String, reason: String },

    /// Writing stdin or collecting output failed after spawn.
    #[error("i/o error while running '{command}': {reason}")]
    Io { command: String, reason: String },
}

/// Errors from the setup orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Reading or writing the state file or setup log failed.
    #[error("setup storage error: {0}")]
    Storage(#[from] StorageError),

    /// The state could not be serialized.
    #[error("failed to serialize setup state: {reason}")]
    Serialize { reason: String },

    /// The step is not in the status the operation requires.
    #[error("step '{step}' is {status}, expected pending")]
    NotPending { step: StepId, status: StepStatus },

    /// Operator input was rejected before anything ran.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A step identifier did not match any known step.
    #[error("unknown setup step: {name}")]
    UnknownStep { name: String },

    /// The setup worker has stopped and no longer accepts commands.
    #[error("setup worker is not running")]
    WorkerUnavailable,
}

/// Errors from reading or rewriting the environment file.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// The file exists but could not be read.
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    /// The file or its backup could not be written.
    #[error("failed to write '{path}': {reason}")]
    Write { path: String, reason: String },

    /// An update was requested with nothing to change.
    #[error("No version updates provided")]
    NoUpdates,
}

/// Errors from backup management.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// No backup directory with this timestamp exists.
    #[error("Backup not found: {timestamp}")]
    NotFound { timestamp: String },

    /// The identifier contains characters that could escape the backup directory.
    #[error("invalid backup identifier '{timestamp}'")]
    InvalidTimestamp { timestamp: String },

    /// A filesystem operation on the backup directory failed.
    #[error("backup i/o error on '{path}': {reason}")]
    Io { path: String, reason: String },

    /// The backup or restore command exited non-zero.
    #[error("'{command}' failed: {output}")]
    CommandFailed { command: String, output: String },

    /// The command could not be run at all.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors from container lifecycle commands.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// `make down` exited non-zero.
    #[error("Failed to stop containers: {stderr}")]
    Stop { stderr: String },

    /// `make up` exited non-zero.
    #[error("Failed to start containers: {stderr}")]
    Start { stderr: String },

    /// The command could not be run at all.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors from the stop → safety backup → restore → start sequence.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// The requested backup does not exist; containers were not touched.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// A stage failed and the containers were brought back up.
    #[error("{reason}")]
    Failed { reason: String },

    /// A stage failed and bringing the containers back up failed too.
    #[error("Restore failed: {reason}. Additionally, failed to restart containers: {recovery}")]
    RecoveryFailed { reason: String, recovery: String },
}

/// Errors from the component version check and update.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// The HTTP client could not be built.
    #[error("failed to build versions client: {reason}")]
    Client { reason: String },

    /// The versions API returned nothing usable.
    #[error("Failed to fetch latest versions")]
    LatestUnavailable,

    /// Every component already runs the latest version.
    #[error("No updates available. All components are already up to date.")]
    UpToDate,

    /// Rewriting the environment file failed.
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Versions were written but the restart failed.
    #[error("Versions updated but failed to restart containers: {0}")]
    Restart(#[source] ContainerError),
}

/// Errors from the Keycloak CLI wrappers.
#[derive(Debug, thiserror::Error)]
pub enum KeycloakError {
    /// Username or password missing.
    #[error("{reason}")]
    InvalidInput { reason: String },

    /// The CLI exited non-zero; the message carries command and output.
    #[error("{message}")]
    CommandFailed { message: String },

    /// The CLI output did not contain a JSON user array.
    #[error("Failed to parse Keycloak users JSON: {reason}\nRaw output:\n{raw}")]
    Parse { reason: String, raw: String },

    /// The command could not be run at all.
    #[error(transparent)]
    Command(#[from] CommandError),
}
