//! The deployment's `.env` file.
//!
//! Loaded once at startup and held in memory. The two writers of the file,
//! `make generate-env` and the version update, are followed by an explicit
//! [`EnvFile::reload`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use crate::error::EnvError;

/// Parsed `KEY=value` pairs of an env file.
#[derive(Debug)]
pub struct EnvFile {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl EnvFile {
    /// Read and parse `path`. A missing file yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Read`] if the file exists but cannot be read.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EnvError> {
        let path = path.as_ref().to_path_buf();
        let values = parse_file(&path).await?;
        tracing::debug!(path = %path.display(), keys = values.len(), "env file loaded");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// An env file with no values yet; [`EnvFile::reload`] fills it.
    pub fn empty(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            values: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Read`] if the file cannot be read; the previous
    /// values are kept in that case.
    pub async fn reload(&self) -> Result<(), EnvError> {
        let fresh = parse_file(&self.path).await?;
        *self.values.write().await = fresh;
        tracing::info!(path = %self.path.display(), "env file reloaded");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.values.read().await.clone()
    }

    /// `ADMIN_USERNAME` and `ADMIN_PASSWORD`, if both are set and non-empty.
    pub async fn admin_credentials(&self) -> Option<(String, String)> {
        let values = self.values.read().await;
        let user = values.get("ADMIN_USERNAME").filter(|v| !v.is_empty())?;
        let pass = values.get("ADMIN_PASSWORD").filter(|v| !v.is_empty())?;
        Some((user.clone(), pass.clone()))
    }

    /// Rewrite the `KEY=` lines named in `updates`, then reload.
    ///
    /// The previous content is copied to `<path>.bak` first. Lines are
    /// matched by prefix, so commented-out or indented keys are left alone.
    /// Returns the number of lines rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::NoUpdates`] for an empty map, or a read/write
    /// error.
    pub async fn update_values(&self, updates: &BTreeMap<String, String>) -> Result<usize, EnvError> {
        if updates.is_empty() {
            return Err(EnvError::NoUpdates);
        }

        let original = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| EnvError::Read {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        let backup = backup_path(&self.path);
        write_file(&backup, &original).await?;

        let mut count = 0usize;
        let mut rewritten = String::with_capacity(original.len());
        for line in original.split_inclusive('\n') {
            let replacement = updates
                .iter()
                .find(|(key, _)| line.starts_with(&format!("{key}=")));
            match replacement {
                Some((key, value)) => {
                    rewritten.push_str(key);
                    rewritten.push('=');
                    rewritten.push_str(value);
                    rewritten.push('\n');
                    count += 1;
                }
                None => rewritten.push_str(line),
            }
        }

        write_file(&self.path, &rewritten).await?;
        self.reload().await?;
        tracing::info!(path = %self.path.display(), count, "env values updated");
        Ok(count)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

async fn parse_file(path: &Path) -> Result<BTreeMap<String, String>, EnvError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(EnvError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            });
        }
    };

    Ok(parse_env(&String::from_utf8_lossy(&raw)))
}

/// Parse `KEY=value` lines literally.
///
/// Blank lines, `#` comments and lines without `=` are skipped. Keys and
/// values are trimmed and surrounding quotes are stripped from values; no
/// variable expansion happens, so `$` is kept as written.
fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, raw_value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = raw_value.trim().trim_matches('"').trim_matches('\'');
        values.insert(key.to_owned(), value.to_owned());
    }
    values
}

async fn write_file(path: &Path, content: &str) -> Result<(), EnvError> {
    let err = |e: std::io::Error| EnvError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, content).await.map_err(err)?;
    tokio::fs::rename(&tmp, path).await.map_err(err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# stack settings\nDOMAIN_NAME=app.example.com\nADMIN_USERNAME=\"admin\"\nADMIN_PASSWORD='pw'\n\nCORE_IMAGE_VERSION=1.0.0\nPORTAL_IMAGE_VERSION=2.0.0\n";

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::load(dir.path().join(".env")).await.unwrap();
        assert!(env.snapshot().await.is_empty());
        assert_eq!(env.admin_credentials().await, None);
    }

    #[tokio::test]
    async fn parses_comments_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, SAMPLE).unwrap();

        let env = EnvFile::load(&path).await.unwrap();

        assert_eq!(env.get("DOMAIN_NAME").await.as_deref(), Some("app.example.com"));
        assert_eq!(
            env.admin_credentials().await,
            Some(("admin".to_owned(), "pw".to_owned()))
        );
        assert_eq!(env.get("# stack settings").await, None);
    }

    #[tokio::test]
    async fn dollar_signs_are_kept_literally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "ADMIN_USERNAME=admin\nADMIN_PASSWORD=pa$word1\nTOKEN=\"${HOME}x\"\n").unwrap();

        let env = EnvFile::load(&path).await.unwrap();

        assert_eq!(
            env.admin_credentials().await,
            Some(("admin".to_owned(), "pa$word1".to_owned()))
        );
        assert_eq!(env.get("TOKEN").await.as_deref(), Some("${HOME}x"));
    }

    #[test]
    fn unquoted_spaces_and_odd_lines_are_accepted() {
        let values = parse_env(
            "COMPANY=Acme Corp\n  export_flag = yes  \nnot a pair\n=orphan\nURL=https://x/?a=b\n",
        );

        assert_eq!(values["COMPANY"], "Acme Corp");
        assert_eq!(values["export_flag"], "yes");
        assert_eq!(values["URL"], "https://x/?a=b");
        assert_eq!(values.len(), 3);
    }

    #[tokio::test]
    async fn update_rewrites_lines_keeps_backup_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, SAMPLE).unwrap();
        let env = EnvFile::load(&path).await.unwrap();

        let updates = BTreeMap::from([
            ("CORE_IMAGE_VERSION".to_owned(), "1.1.0".to_owned()),
            ("WORKFLOW_IMAGE_VERSION".to_owned(), "3.0.0".to_owned()),
        ]);
        let count = env.update_values(&updates).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(env.get("CORE_IMAGE_VERSION").await.as_deref(), Some("1.1.0"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("CORE_IMAGE_VERSION=1.1.0\n"));
        assert!(written.contains("PORTAL_IMAGE_VERSION=2.0.0\n"));
        assert!(written.starts_with("# stack settings\n"));
        let backup = std::fs::read_to_string(dir.path().join(".env.bak")).unwrap();
        assert_eq!(backup, SAMPLE);
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, SAMPLE).unwrap();
        let env = EnvFile::load(&path).await.unwrap();

        let err = env.update_values(&BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, EnvError::NoUpdates));
        assert!(!dir.path().join(".env.bak").exists());
    }

    #[tokio::test]
    async fn reload_picks_up_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let env = EnvFile::load(&path).await.unwrap();

        std::fs::write(&path, "DOMAIN_NAME=late.example.com\n").unwrap();
        env.reload().await.unwrap();

        assert_eq!(env.get("DOMAIN_NAME").await.as_deref(), Some("late.example.com"));
    }
}
