//! Persisted setup state.
//!
//! [`SetupState`] maps every step to its status and is stored as a flat JSON
//! object (`{"generate_env": "done", "init_cert": "requested", ...}`).
//! [`SetupStore`] loads and saves it through a [`DocumentStore`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stackadm_storage::DocumentStore;

use crate::error::SetupError;
use crate::step::{StepId, StepStatus};

/// What the provisioning scripts should do about restoring a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreBackup {
    /// No archive was uploaded with the initial settings.
    Skip,
    /// An archive was uploaded and waits in the upload location.
    Uploaded,
}

impl RestoreBackup {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Uploaded => "uploaded",
        }
    }
}

/// Status of every setup step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupState {
    #[serde(flatten)]
    steps: BTreeMap<StepId, StepStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restore_backup: Option<RestoreBackup>,
}

impl Default for SetupState {
    fn default() -> Self {
        Self::initial()
    }
}

impl SetupState {
    /// Every step pending.
    pub fn initial() -> Self {
        Self {
            steps: StepId::ALL
                .into_iter()
                .map(|id| (id, StepStatus::Pending))
                .collect(),
            restore_backup: None,
        }
    }

    /// Status of `step`; steps absent from an older file read as pending.
    pub fn status(&self, step: StepId) -> StepStatus {
        self.steps.get(&step).copied().unwrap_or_default()
    }

    pub fn set(&mut self, step: StepId, status: StepStatus) {
        self.steps.insert(step, status);
    }

    /// Move `step` from `pending` to `requested`.
    ///
    /// Returns `false` and changes nothing when the step is in any other
    /// status, so a re-submitted form cannot disturb a running sequence.
    pub fn request(&mut self, step: StepId) -> bool {
        if self.status(step) != StepStatus::Pending {
            return false;
        }
        self.set(step, StepStatus::Requested);
        true
    }

    /// First step (in sequence order) currently in `status`.
    pub fn first_with(&self, status: StepStatus) -> Option<StepId> {
        StepId::ALL.into_iter().find(|&id| self.status(id) == status)
    }

    /// All steps done.
    pub fn is_complete(&self) -> bool {
        StepId::ALL
            .into_iter()
            .all(|id| self.status(id) == StepStatus::Done)
    }

    /// Steps with their statuses, in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = (StepId, StepStatus)> + '_ {
        StepId::ALL.into_iter().map(|id| (id, self.status(id)))
    }

    pub fn restore_backup(&self) -> Option<RestoreBackup> {
        self.restore_backup
    }

    pub fn set_restore_backup(&mut self, restore: RestoreBackup) {
        self.restore_backup = Some(restore);
    }

    /// Add any step missing from a file written by an older sequence.
    fn fill_missing(&mut self) {
        for id in StepId::ALL {
            self.steps.entry(id).or_default();
        }
    }
}

/// Loads and saves [`SetupState`] as a single JSON document.
#[derive(Clone)]
pub struct SetupStore {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl SetupStore {
    /// Store the state in document `name` of `store`.
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Load the persisted state.
    ///
    /// A missing document is initialized to all-pending and written back. A
    /// document that does not parse is treated the same way, with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Storage`] if the document cannot be read or the
    /// fresh state cannot be written.
    pub async fn load(&self) -> Result<SetupState, SetupError> {
        let Some(raw) = self.store.read(&self.name).await? else {
            tracing::info!(document = %self.name, "no setup state found, initializing");
            return self.initialize().await;
        };

        match serde_json::from_slice::<SetupState>(&raw) {
            Ok(mut state) => {
                state.fill_missing();
                Ok(state)
            }
            Err(e) => {
                tracing::warn!(
                    document = %self.name,
                    error = %e,
                    "setup state is unreadable, re-initializing"
                );
                self.initialize().await
            }
        }
    }

    /// Overwrite the persisted state with `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if serialization or the write fails.
    pub async fn save(&self, state: &SetupState) -> Result<(), SetupError> {
        let data = serde_json::to_vec_pretty(state).map_err(|e| SetupError::Serialize {
            reason: e.to_string(),
        })?;
        self.store.write(&self.name, &data).await?;
        Ok(())
    }

    async fn initialize(&self) -> Result<SetupState, SetupError> {
        let state = SetupState::initial();
        self.save(&state).await?;
        Ok(state)
    }
}

impl std::fmt::Debug for SetupStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
