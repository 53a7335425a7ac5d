#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::sync::watch;
use tower::ServiceExt;

use stackadm_core::autostart::Autostart;
use stackadm_core::command::ScriptedRunner;
use stackadm_core::layout::ProjectLayout;
use stackadm_core::versions::FixedVersionSource;
use stackadm_server::build_router;
use stackadm_server::state::{AppState, StateOptions};

/// A console over a temporary project directory with scripted commands.
///
/// The runner tick is an hour so only explicit intents move the state.
pub struct TestApp {
    pub dir: TempDir,
    pub runner: ScriptedRunner,
    pub state: Arc<AppState>,
    router: Router,
    _shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_latest(FixedVersionSource::default()).await
    }

    pub async fn with_latest(latest: FixedVersionSource) -> Self {
        Self::build(latest, None).await
    }

    /// Start with `.env` already written.
    pub async fn with_env(env: &str) -> Self {
        Self::build(FixedVersionSource::default(), Some(env)).await
    }

    pub async fn with_env_and_latest(env: &str, latest: FixedVersionSource) -> Self {
        Self::build(latest, Some(env)).await
    }

    async fn build(latest: FixedVersionSource, env: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        if let Some(env) = env {
            std::fs::write(dir.path().join(ProjectLayout::ENV_FILE), env).unwrap();
        }

        let runner = ScriptedRunner::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let opts = StateOptions {
            layout: ProjectLayout::new(dir.path()),
            commands: Arc::new(runner.clone()),
            latest_versions: Arc::new(latest),
            runner_interval: Duration::from_secs(3600),
            autostart: Autostart::new(Arc::new(runner.clone()), "init-setup")
                .with_unit_dir(dir.path().join("systemd")),
        };
        let (state, _worker) = AppState::start(opts, shutdown_rx).await.unwrap();
        let router = build_router(Arc::clone(&state));

        Self {
            dir,
            runner,
            state,
            router,
            _shutdown: shutdown_tx,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, body: &str) -> Response<Body> {
        let req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_owned()))
            .unwrap();
        self.send(req).await
    }

    pub async fn send_json(&self, method: &str, uri: &str, json: &str) -> Response<Body> {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_owned()))
            .unwrap();
        self.send(req).await
    }

    pub fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn location(resp: &Response<Body>) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}
