//! Filesystem document store, the production default.
//!
//! Each document is a file under a root directory. Whole-document writes go
//! through a sibling temporary file followed by a rename, so a concurrent
//! reader never sees a half-written state file. Appends open the file in
//! append mode and write the chunk in one call.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::{DocumentStore, StorageError};

/// A document store rooted at a directory.
///
/// # Examples
///
/// ```no_run
/// # use stackadm_storage::FileStore;
/// let store = FileStore::new("/opt/stack");
/// assert_eq!(store.root(), std::path::Path::new("/opt/stack"));
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is not touched until
    /// the first write.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Return the root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a document name to a path inside the root.
    ///
    /// Only plain relative components are accepted; `..`, absolute paths and
    /// empty names are rejected.
    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(name);
        let valid = !name.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !valid {
            return Err(StorageError::InvalidName {
                name: name.to_owned(),
            });
        }
        Ok(self.root.join(rel))
    }

    async fn ensure_parent(path: &Path, name: &str) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Write {
                    name: name.to_owned(),
                    reason: format!("failed to create '{}': {e}", parent.display()),
                })?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for FileStore {
    async fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Read {
                name: name.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        Self::ensure_parent(&path, name).await?;

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let write_err = |e: std::io::Error| StorageError::Write {
            name: name.to_owned(),
            reason: e.to_string(),
        };

        fs::write(&tmp, data).await.map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        tracing::trace!(document = name, bytes = data.len(), "document written");
        Ok(())
    }

    async fn append(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        Self::ensure_parent(&path, name).await?;

        let write_err = |e: std::io::Error| StorageError::Write {
            name: name.to_owned(),
            reason: e.to_string(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(data).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete {
                name: name.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.resolve(name)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::Read {
                name: name.to_owned(),
                reason: e.to_string(),
            })
    }
}
