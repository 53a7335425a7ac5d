//! Identity-provider user management through the deployment's `make`
//! targets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::command::{CommandRunner, CommandSpec};
use crate::error::KeycloakError;

/// A user as printed by `make list-users`.
///
/// Only the fields the console shows are typed; everything else Keycloak
/// returns is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone)]
pub struct KeycloakCli {
    commands: Arc<dyn CommandRunner>,
}

impl KeycloakCli {
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }

    /// Create a user. Returns the trimmed CLI output.
    ///
    /// # Errors
    ///
    /// [`KeycloakError::InvalidInput`] if the trimmed username or the
    /// password is empty, [`KeycloakError::CommandFailed`] on a non-zero
    /// exit. The password never appears in the error.
    pub async fn add_user(&self, username: &str, password: &str) -> Result<String, KeycloakError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(KeycloakError::InvalidInput {
                reason: "Username and password are required.".to_owned(),
            });
        }

        let spec = CommandSpec::make("add-user")
            .arg(format!("USERNAME={username}"))
            .arg(format!("PASSWORD={password}"));
        let out = self.commands.run(&spec, None).await?;

        if !out.success() {
            let shown = format!("make add-user USERNAME={username} PASSWORD=********");
            return Err(KeycloakError::CommandFailed {
                message: failure_message("Failed to add Keycloak user via CLI.", &shown, &out.combined()),
            });
        }

        tracing::info!(%username, "keycloak user created");
        Ok(out.combined().trim().to_owned())
    }

    /// List users.
    ///
    /// # Errors
    ///
    /// [`KeycloakError::CommandFailed`] on a non-zero exit,
    /// [`KeycloakError::Parse`] if the output holds no JSON array.
    pub async fn list_users(&self) -> Result<Vec<KeycloakUser>, KeycloakError> {
        let spec = CommandSpec::make("list-users");
        let out = self.commands.run(&spec, None).await?;

        if !out.success() {
            return Err(KeycloakError::CommandFailed {
                message: failure_message(
                    "Failed to list Keycloak users via CLI.",
                    &spec.to_string(),
                    &out.combined(),
                ),
            });
        }

        parse_users(&out.stdout)
    }
}

impl std::fmt::Debug for KeycloakCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakCli").finish_non_exhaustive()
    }
}

fn failure_message(headline: &str, command: &str, output: &str) -> String {
    format!("{headline}\nCommand: {command}\nOutput:\n{output}")
        .trim()
        .to_owned()
}

/// Parse `make list-users` output.
///
/// `make` may echo the invoked script before the JSON, so everything before
/// the first `[` is dropped. Empty output is an empty list.
///
/// # Errors
///
/// [`KeycloakError::Parse`] if no array is found or it does not parse.
pub fn parse_users(stdout: &str) -> Result<Vec<KeycloakUser>, KeycloakError> {
    let raw = stdout.trim();
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    let Some(start) = raw.find('[') else {
        return Err(KeycloakError::Parse {
            reason: "JSON array not found".to_owned(),
            raw: raw.to_owned(),
        });
    };
    serde_json::from_str(&raw[start..]).map_err(|e| KeycloakError::Parse {
        reason: e.to_string(),
        raw: raw.to_owned(),
    })
}
