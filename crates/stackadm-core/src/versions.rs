//! Component versions: what runs now, what is published, and the upgrade.
//!
//! Current versions are `*_IMAGE_VERSION` keys in `.env`. Latest versions
//! come from the release API, keyed by application name.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::containers::ContainerControl;
use crate::env::EnvFile;
use crate::error::VersionError;

/// Env variable → application name in the release API.
pub const VERSION_MAPPING: [(&str, &str); 5] = [
    ("CORE_IMAGE_VERSION", "backend"),
    ("WORKFLOW_IMAGE_VERSION", "workflow"),
    ("PORTAL_IMAGE_VERSION", "portal"),
    ("VUE_PORTAL_IMAGE_VERSION", "vue-portal"),
    ("WORKFLOW_PORTAL_IMAGE_VERSION", "workflow-portal"),
];

/// Default release API endpoint.
pub const DEFAULT_VERSIONS_URL: &str =
    "https://license.finmars.com/api/v1/version/get-latest/?channel=stable";

/// Current and latest version of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentVersion {
    pub env_var: String,
    pub app_name: String,
    /// Empty when the key is missing from `.env`.
    pub current_version: String,
    /// Empty when the API did not report this application.
    pub latest_version: String,
    pub needs_update: bool,
}

/// Where latest versions come from.
#[async_trait::async_trait]
pub trait LatestVersionSource: Send + Sync + 'static {
    /// Application name → latest version. Empty when unavailable.
    async fn latest(&self) -> BTreeMap<String, String>;
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    results: Vec<LatestEntry>,
}

#[derive(Debug, Deserialize)]
struct LatestEntry {
    app: Option<String>,
    version: Option<String>,
}

/// Parse the release API body. Entries without an app or version are
/// skipped.
///
/// # Errors
///
/// Returns the JSON error if the body is not an object.
pub fn parse_latest(body: &[u8]) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let resp: LatestResponse = serde_json::from_slice(body)?;
    Ok(resp
        .results
        .into_iter()
        .filter_map(|e| match (e.app, e.version) {
            (Some(app), Some(version)) if !app.is_empty() && !version.is_empty() => {
                Some((app, version))
            }
            _ => None,
        })
        .collect())
}

/// Fetches latest versions over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpVersionSource {
    client: reqwest::Client,
    url: String,
}

impl HttpVersionSource {
    /// # Errors
    ///
    /// Returns [`VersionError::Client`] if the TLS backend cannot be set up.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VersionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VersionError::Client {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self) -> Result<BTreeMap<String, String>, String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;
        let body = resp.bytes().await.map_err(|e| e.to_string())?;
        parse_latest(&body).map_err(|e| e.to_string())
    }
}

#[async_trait::async_trait]
impl LatestVersionSource for HttpVersionSource {
    async fn latest(&self) -> BTreeMap<String, String> {
        match self.fetch().await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "failed to fetch latest versions");
                BTreeMap::new()
            }
        }
    }
}

/// Pair current `.env` values with `latest` for every mapped component.
pub fn compare(
    env: &BTreeMap<String, String>,
    latest: &BTreeMap<String, String>,
) -> Vec<ComponentVersion> {
    VERSION_MAPPING
        .iter()
        .map(|&(env_var, app_name)| {
            let current_version = env.get(env_var).cloned().unwrap_or_default();
            let latest_version = latest.get(app_name).cloned().unwrap_or_default();
            ComponentVersion {
                env_var: env_var.to_owned(),
                app_name: app_name.to_owned(),
                needs_update: !latest_version.is_empty() && current_version != latest_version,
                current_version,
                latest_version,
            }
        })
        .collect()
}

/// The `.env` rewrites an upgrade would apply.
///
/// Every component the API reports is written, not only the outdated ones.
///
/// # Errors
///
/// [`VersionError::LatestUnavailable`] if `latest` is empty,
/// [`VersionError::UpToDate`] if nothing differs.
pub fn plan_update(
    env: &BTreeMap<String, String>,
    latest: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, VersionError> {
    if latest.is_empty() {
        return Err(VersionError::LatestUnavailable);
    }
    if !compare(env, latest).iter().any(|c| c.needs_update) {
        return Err(VersionError::UpToDate);
    }
    Ok(VERSION_MAPPING
        .iter()
        .filter_map(|&(env_var, app_name)| {
            latest
                .get(app_name)
                .map(|v| (env_var.to_owned(), v.clone()))
        })
        .collect())
}

/// Version check and upgrade for the console.
#[derive(Clone)]
pub struct VersionService {
    env: Arc<EnvFile>,
    source: Arc<dyn LatestVersionSource>,
    containers: ContainerControl,
}

impl VersionService {
    pub fn new(
        env: Arc<EnvFile>,
        source: Arc<dyn LatestVersionSource>,
        containers: ContainerControl,
    ) -> Self {
        Self {
            env,
            source,
            containers,
        }
    }

    pub async fn check(&self) -> Vec<ComponentVersion> {
        let latest = self.source.latest().await;
        compare(&self.env.snapshot().await, &latest)
    }

    /// Write the latest versions into `.env` and restart the stack.
    ///
    /// # Errors
    ///
    /// See [`plan_update`]; also [`VersionError::Env`] if the file cannot be
    /// rewritten and [`VersionError::Restart`] if the restart fails after
    /// the file was written.
    pub async fn apply_update(&self) -> Result<String, VersionError> {
        let latest = self.source.latest().await;
        let updates = plan_update(&self.env.snapshot().await, &latest)?;

        let count = self.env.update_values(&updates).await?;
        self.containers
            .restart()
            .await
            .map_err(VersionError::Restart)?;

        tracing::info!(count, "component versions updated");
        Ok(format!(
            "Updated {count} versions. Containers restarted successfully"
        ))
    }
}

impl std::fmt::Debug for VersionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionService")
            .field("env", &self.env.path())
            .finish_non_exhaustive()
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use fixed::FixedVersionSource;

#[cfg(any(test, feature = "test-util"))]
mod fixed {
    use std::collections::BTreeMap;

    use super::LatestVersionSource;

    /// Returns the same map on every call.
    #[derive(Debug, Clone, Default)]
    pub struct FixedVersionSource(pub BTreeMap<String, String>);

    impl FixedVersionSource {
        pub fn new<I, K, V>(entries: I) -> Self
        where
            I: IntoIterator<Item = (K, V)>,
            K: Into<String>,
            V: Into<String>,
        {
            Self(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            )
        }
    }

    #[async_trait::async_trait]
    impl LatestVersionSource for FixedVersionSource {
        async fn latest(&self) -> BTreeMap<String, String> {
            self.0.clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::command::ScriptedRunner;

    fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn parse_skips_incomplete_entries() {
        let body = br#"{"results":[
            {"app":"backend","version":"1.1.0"},
            {"app":"portal"},
            {"version":"9.9.9"},
            {"app":"workflow","version":"2.0.0","channel":"stable"}
        ]}"#;
        let latest = parse_latest(body).unwrap();
        assert_eq!(latest, env_map(&[("backend", "1.1.0"), ("workflow", "2.0.0")]));
        assert!(parse_latest(b"{}").unwrap().is_empty());
    }

    #[test]
    fn compare_marks_outdated_components() {
        let env = env_map(&[("CORE_IMAGE_VERSION", "1.0.0"), ("PORTAL_IMAGE_VERSION", "3.0.0")]);
        let latest = env_map(&[("backend", "1.1.0"), ("portal", "3.0.0")]);

        let rows = compare(&env, &latest);

        assert_eq!(rows.len(), 5);
        let core = &rows[0];
        assert_eq!(core.current_version, "1.0.0");
        assert_eq!(core.latest_version, "1.1.0");
        assert!(core.needs_update);
        assert!(!rows[2].needs_update);
        // Unknown latest never needs an update, even with no current value.
        assert!(!rows[1].needs_update);
    }

    #[test]
    fn plan_update_errors() {
        let env = env_map(&[("CORE_IMAGE_VERSION", "1.1.0")]);
        assert!(matches!(
            plan_update(&env, &BTreeMap::new()),
            Err(VersionError::LatestUnavailable)
        ));
        assert!(matches!(
            plan_update(&env, &env_map(&[("backend", "1.1.0")])),
            Err(VersionError::UpToDate)
        ));
        let plan = plan_update(&env, &env_map(&[("backend", "1.1.0"), ("portal", "4.0.0")])).unwrap();
        assert_eq!(
            plan,
            env_map(&[("CORE_IMAGE_VERSION", "1.1.0"), ("PORTAL_IMAGE_VERSION", "4.0.0")])
        );
    }

    #[tokio::test]
    async fn apply_update_rewrites_env_and_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "CORE_IMAGE_VERSION=1.0.0\nDOMAIN_NAME=x\n").unwrap();
        let env = Arc::new(EnvFile::load(&path).await.unwrap());
        let runner = ScriptedRunner::new();
        let service = VersionService::new(
            env.clone(),
            Arc::new(FixedVersionSource::new([("backend", "1.1.0")])),
            ContainerControl::new(Arc::new(runner.clone())),
        );

        let msg = service.apply_update().await.unwrap();

        assert_eq!(msg, "Updated 1 versions. Containers restarted successfully");
        assert_eq!(env.get("CORE_IMAGE_VERSION").await.as_deref(), Some("1.1.0"));
        assert_eq!(runner.commands(), vec!["make down", "make up"]);
        assert!(dir.path().join(".env.bak").exists());
    }

    #[tokio::test]
    async fn restart_failure_is_reported_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "CORE_IMAGE_VERSION=1.0.0\n").unwrap();
        let env = Arc::new(EnvFile::load(&path).await.unwrap());
        let runner = ScriptedRunner::new();
        runner.fail("make up", "image pull failed");
        let service = VersionService::new(
            env,
            Arc::new(FixedVersionSource::new([("backend", "1.1.0")])),
            ContainerControl::new(Arc::new(runner)),
        );

        let err = service.apply_update().await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Versions updated but failed to restart containers: Failed to start containers: image pull failed"
        );
    }

    #[tokio::test]
    async fn http_source_reads_results() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            let body = r#"{"results":[{"app":"backend","version":"1.1.0"}]}"#;
            let resp = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
        });

        let source = HttpVersionSource::new(format!("http://{addr}/latest"), Duration::from_secs(5)).unwrap();

        assert_eq!(source.latest().await, env_map(&[("backend", "1.1.0")]));
    }

    #[tokio::test]
    async fn http_source_failure_is_empty() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpVersionSource::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();

        assert!(source.latest().await.is_empty());
    }
}
