//! The provisioning sequence.
//!
//! Four steps, always in this order. Only their runtime status is persisted;
//! identifiers, commands and titles are fixed here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::command::CommandSpec;
use crate::error::SetupError;

/// Identifier of a setup step. Ordering follows the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    /// Write `.env` from the operator's initial settings.
    GenerateEnv,
    /// Request TLS certificates.
    InitCert,
    /// Bootstrap the identity provider.
    InitKeycloak,
    /// Start all services.
    DockerUp,
}

impl StepId {
    /// All steps in execution order.
    pub const ALL: [Self; 4] = [
        Self::GenerateEnv,
        Self::InitCert,
        Self::InitKeycloak,
        Self::DockerUp,
    ];

    /// Identifier as stored in the state file and sent by the setup form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GenerateEnv => "generate_env",
            Self::InitCert => "init_cert",
            Self::InitKeycloak => "init_keycloak",
            Self::DockerUp => "docker_up",
        }
    }

    /// Human-readable title, also the section header in the setup log.
    pub const fn title(self) -> &'static str {
        match self {
            Self::GenerateEnv => "Initial Settings",
            Self::InitCert => "Request Certificates",
            Self::InitKeycloak => "Initializing Single-Sign-On",
            Self::DockerUp => "Starting Services",
        }
    }

    /// `make` target run for this step.
    pub const fn make_target(self) -> &'static str {
        match self {
            Self::GenerateEnv => "generate-env",
            Self::InitCert => "init-cert",
            Self::InitKeycloak => "init-keycloak",
            Self::DockerUp => "up",
        }
    }

    /// External command run for this step.
    pub fn command(self) -> CommandSpec {
        CommandSpec::make(self.make_target())
    }

    /// Zero-based position in the sequence.
    pub const fn position(self) -> usize {
        self as usize
    }

    /// The step after this one, `None` for the terminal step.
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// Whether this is the last step (`docker_up`).
    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| SetupError::UnknownStep { name: s.to_owned() })
    }
}

/// Runtime status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet asked for.
    #[default]
    Pending,
    /// Asked for; the runner will pick it up.
    Requested,
    /// The runner is executing its command.
    InProgress,
    /// The command exited zero.
    Done,
    /// The command exited non-zero or could not be started.
    Failed,
}

impl StepStatus {
    /// Stored string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Requested => "requested",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step with its command and title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: StepId,
    pub command: CommandSpec,
    pub title: &'static str,
}

/// The ordered provisioning sequence.
pub fn steps() -> Vec<Step> {
    StepId::ALL
        .into_iter()
        .map(|id| Step {
            id,
            command: id.command(),
            title: id.title(),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_fixed() {
        let ids: Vec<_> = steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["generate_env", "init_cert", "init_keycloak", "docker_up"]);

        let cmds: Vec<_> = steps().iter().map(|s| s.command.to_string()).collect();
        assert_eq!(
            cmds,
            ["make generate-env", "make init-cert", "make init-keycloak", "make up"]
        );
    }

    #[test]
    fn next_walks_the_sequence() {
        assert_eq!(StepId::GenerateEnv.next(), Some(StepId::InitCert));
        assert_eq!(StepId::InitKeycloak.next(), Some(StepId::DockerUp));
        assert_eq!(StepId::DockerUp.next(), None);
        assert!(StepId::DockerUp.is_terminal());
        assert!(!StepId::InitCert.is_terminal());
    }

    #[test]
    fn parses_identifiers() {
        assert_eq!("init_keycloak".parse::<StepId>().unwrap(), StepId::InitKeycloak);
        assert!(matches!(
            "restore_backup".parse::<StepId>(),
            Err(SetupError::UnknownStep { .. })
        ));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StepStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::from_str::<StepStatus>("\"requested\"").unwrap(),
            StepStatus::Requested
        );
    }
}
