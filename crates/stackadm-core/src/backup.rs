//! Backup management.
//!
//! Each backup is a directory `<backup_dir>/<YYYYMMDDHHMMSS>/` holding a
//! `dump.zip` and, optionally, a `description.txt`. A directory without
//! `dump.zip` is not a backup and is never listed. Creating and restoring
//! the dump itself is done by `make backup` and `make restore`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::command::{CommandRunner, CommandSpec};
use crate::containers::ContainerControl;
use crate::error::{BackupError, RestoreError};

/// Archive file that marks a directory as a backup.
pub const DUMP_FILE: &str = "dump.zip";
/// Optional operator description.
pub const DESCRIPTION_FILE: &str = "description.txt";
/// Shown when a backup has no description.
pub const NO_DESCRIPTION: &str = "No description provided";

/// One listed backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    /// Directory name, used as the backup identifier.
    pub timestamp: String,
    pub description: String,
    /// Total size in bytes of the files in the backup directory.
    pub size: u64,
    pub created: DateTime<Utc>,
}

/// Lists, creates, deletes and restores backups.
#[derive(Clone)]
pub struct BackupManager {
    dir: PathBuf,
    commands: Arc<dyn CommandRunner>,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, commands: Arc<dyn CommandRunner>) -> Self {
        Self {
            dir: dir.into(),
            commands,
        }
    }

    /// All valid backups, newest first.
    ///
    /// A missing backup directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Io`] if the directory exists but cannot be read.
    pub async fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %self.dir.display(), "backup directory not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_err(&self.dir, &e)),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_err(&self.dir, &e))?
        {
            let path = entry.path();
            if !path.join(DUMP_FILE).is_file() {
                continue;
            }
            let Some(timestamp) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            backups.push(describe(&path, timestamp).await?);
        }

        backups.sort_by(|a, b| {
            b.created
                .cmp(&a.created)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        Ok(backups)
    }

    /// Run `make backup` under a fresh UTC timestamp and store the
    /// description next to the dump. Returns the timestamp.
    ///
    /// # Errors
    ///
    /// [`BackupError::CommandFailed`] on a non-zero exit, or an i/o error
    /// writing the description.
    pub async fn create(&self, description: Option<&str>) -> Result<String, BackupError> {
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let spec = CommandSpec::make("backup").arg(format!("TIMESTAMP={timestamp}"));

        let out = self.commands.run(&spec, None).await?;
        if !out.success() {
            return Err(BackupError::CommandFailed {
                command: spec.to_string(),
                output: out.combined().trim().to_owned(),
            });
        }

        if let Some(text) = description.map(str::trim).filter(|t| !t.is_empty()) {
            let dir = self.dir.join(&timestamp);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| io_err(&dir, &e))?;
            let file = dir.join(DESCRIPTION_FILE);
            tokio::fs::write(&file, text)
                .await
                .map_err(|e| io_err(&file, &e))?;
        }

        tracing::info!(%timestamp, "backup created");
        Ok(timestamp)
    }

    /// Remove a backup directory and everything in it.
    ///
    /// # Errors
    ///
    /// [`BackupError::NotFound`] if no such directory exists.
    pub async fn delete(&self, timestamp: &str) -> Result<(), BackupError> {
        let path = self.backup_path(timestamp)?;
        if !path.is_dir() {
            return Err(BackupError::NotFound {
                timestamp: timestamp.to_owned(),
            });
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| io_err(&path, &e))?;
        tracing::info!(%timestamp, "backup deleted");
        Ok(())
    }

    /// Path of the backup's `dump.zip`.
    ///
    /// # Errors
    ///
    /// [`BackupError::NotFound`] if the backup or its dump does not exist.
    pub fn dump_path(&self, timestamp: &str) -> Result<PathBuf, BackupError> {
        let dump = self.backup_path(timestamp)?.join(DUMP_FILE);
        if !dump.is_file() {
            return Err(BackupError::NotFound {
                timestamp: timestamp.to_owned(),
            });
        }
        Ok(dump)
    }

    /// Run `make restore` for an existing backup. Containers are not touched.
    ///
    /// # Errors
    ///
    /// [`BackupError::NotFound`] or [`BackupError::CommandFailed`].
    pub async fn restore(&self, timestamp: &str) -> Result<(), BackupError> {
        self.dump_path(timestamp)?;
        let spec = CommandSpec::make("restore").arg(format!("TIMESTAMP={timestamp}"));

        let out = self.commands.run(&spec, None).await?;
        if !out.success() {
            return Err(BackupError::CommandFailed {
                command: spec.to_string(),
                output: out.combined().trim().to_owned(),
            });
        }
        tracing::info!(%timestamp, "backup restored");
        Ok(())
    }

    /// Stop containers, take a safety backup, restore `timestamp`, start
    /// containers.
    ///
    /// If any stage fails the containers are started again before the error
    /// is returned. Returns the operator-facing success message.
    ///
    /// # Errors
    ///
    /// [`RestoreError::Backup`] if the backup does not exist (nothing was
    /// touched), [`RestoreError::Failed`] if a stage failed and the
    /// containers came back, [`RestoreError::RecoveryFailed`] if they did not.
    pub async fn restore_with_restart(
        &self,
        containers: &ContainerControl,
        timestamp: &str,
    ) -> Result<String, RestoreError> {
        self.dump_path(timestamp)?;

        if let Err(reason) = self.restore_stages(containers, timestamp).await {
            tracing::warn!(%timestamp, error = %reason, "restore failed, starting containers");
            return Err(match containers.up().await {
                Ok(()) => RestoreError::Failed { reason },
                Err(e) => RestoreError::RecoveryFailed {
                    reason,
                    recovery: e.to_string(),
                },
            });
        }

        Ok(format!(
            "Backup {timestamp} restored successfully. Containers stopped, backup restored, and containers restarted."
        ))
    }

    async fn restore_stages(
        &self,
        containers: &ContainerControl,
        timestamp: &str,
    ) -> Result<(), String> {
        containers.down().await.map_err(|e| e.to_string())?;
        let safety = format!("Automatic backup before restoring {timestamp}");
        self.create(Some(&safety)).await.map_err(|e| e.to_string())?;
        self.restore(timestamp).await.map_err(|e| e.to_string())?;
        containers.up().await.map_err(|e| e.to_string())
    }

    fn backup_path(&self, timestamp: &str) -> Result<PathBuf, BackupError> {
        let valid = !timestamp.is_empty()
            && timestamp
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(BackupError::InvalidTimestamp {
                timestamp: timestamp.to_owned(),
            });
        }
        Ok(self.dir.join(timestamp))
    }
}

async fn describe(path: &Path, timestamp: String) -> Result<BackupInfo, BackupError> {
    let description = match tokio::fs::read_to_string(path.join(DESCRIPTION_FILE)).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_owned(),
        _ => NO_DESCRIPTION.to_owned(),
    };

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| io_err(path, &e))?;
    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .map(DateTime::<Utc>::from)
        .map_err(|e| io_err(path, &e))?;

    let mut size = 0u64;
    let mut files = tokio::fs::read_dir(path)
        .await
        .map_err(|e| io_err(path, &e))?;
    while let Some(file) = files.next_entry().await.map_err(|e| io_err(path, &e))? {
        if let Ok(m) = file.metadata().await {
            if m.is_file() {
                size += m.len();
            }
        }
    }

    Ok(BackupInfo {
        timestamp,
        description,
        size,
        created,
    })
}

fn io_err(path: &Path, e: &std::io::Error) -> BackupError {
    BackupError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}
