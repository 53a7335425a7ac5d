//! Where things live inside the project directory.

use std::path::{Path, PathBuf};

use stackadm_storage::FileStore;

/// Fixed file layout of a deployment, relative to the project directory
/// (the directory holding the `Makefile` and `docker-compose.yml`).
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Persisted setup state, a document name inside the project store.
    pub const STATE_FILE: &'static str = ".init-setup-state.json";
    /// Setup step log, a document name inside the project store.
    pub const SETUP_LOG: &'static str = "init-setup-log.txt";
    /// Environment file written by `make generate-env`.
    pub const ENV_FILE: &'static str = ".env";
    /// Directory holding one subdirectory per backup.
    pub const BACKUP_DIR: &'static str = "dumps";
    /// Where an archive uploaded with the initial settings is stored.
    pub const UPLOAD_FILE: &'static str = "tmp/backup.zip";

    /// Layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The project directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document store over the project directory.
    #[must_use]
    pub fn store(&self) -> FileStore {
        FileStore::new(&self.root)
    }

    #[must_use]
    pub fn env_path(&self) -> PathBuf {
        self.root.join(Self::ENV_FILE)
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(Self::BACKUP_DIR)
    }

    #[must_use]
    pub fn upload_path(&self) -> PathBuf {
        self.root.join(Self::UPLOAD_FILE)
    }
}
