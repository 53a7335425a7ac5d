//! Append-only text log of executed setup steps.

use std::sync::Arc;

use stackadm_storage::DocumentStore;

use crate::error::SetupError;

/// Step output log, one `### <title>` section per executed step.
#[derive(Clone)]
pub struct SetupLog {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl SetupLog {
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Append a section for `title` holding `stdout` then `stderr`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Storage`] if the append fails.
    pub async fn append(&self, title: &str, stdout: &str, stderr: &str) -> Result<(), SetupError> {
        let mut section = String::with_capacity(title.len() + stdout.len() + stderr.len() + 8);
        section.push_str("\n\n### ");
        section.push_str(title);
        section.push('\n');
        section.push_str(stdout);
        section.push_str(stderr);
        self.store.append(&self.name, section.as_bytes()).await?;
        Ok(())
    }

    /// The whole log, empty if nothing has been written yet.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Storage`] if the read fails.
    pub async fn read(&self) -> Result<String, SetupError> {
        Ok(self
            .store
            .read(&self.name)
            .await?
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_default())
    }

    /// Delete the log. Called once at server start.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Storage`] if the removal fails.
    pub async fn clear(&self) -> Result<(), SetupError> {
        self.store.remove(&self.name).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SetupLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupLog")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
