//! Integration tests for the setup wizard at `/`.

#![allow(clippy::unwrap_used)]

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{TestApp, body_string, location};
use stackadm_core::layout::ProjectLayout;
use stackadm_core::state::RestoreBackup;
use stackadm_core::step::{StepId, StepStatus};

const SETTINGS: &str = "step=generate_env&DOMAIN=app.example.com&AUTH_DOMAIN=auth.example.com\
                        &ADMIN_USERNAME=admin&ADMIN_PASSWORD=s3cret";

fn state_file(app: &TestApp) -> serde_json::Value {
    let raw = std::fs::read(app.path(ProjectLayout::STATE_FILE)).unwrap();
    serde_json::from_slice(&raw).unwrap()
}

#[tokio::test]
async fn fresh_install_shows_initial_form() {
    let app = TestApp::new().await;

    let resp = app.get("/").await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains(r#"name="DOMAIN""#));
    assert!(body.contains(r#"name="backup_file""#));
    assert_eq!(state_file(&app)["generate_env"], "pending");
}

#[tokio::test]
async fn initial_settings_run_first_step_and_request_second() {
    let app = TestApp::new().await;

    let resp = app.post_form("/", SETTINGS).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let snapshot = app.state.setup.snapshot();
    assert_eq!(snapshot.status(StepId::GenerateEnv), StepStatus::Done);
    assert_eq!(snapshot.status(StepId::InitCert), StepStatus::Requested);
    assert_eq!(snapshot.restore_backup(), Some(RestoreBackup::Skip));

    let calls = app.runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].command, "make generate-env");
    assert_eq!(
        calls[0].stdin.as_deref(),
        Some("P\napp.example.com\nauth.example.com\nadmin\ns3cret\n")
    );

    let file = state_file(&app);
    assert_eq!(file["generate_env"], "done");
    assert_eq!(file["init_cert"], "requested");
    assert_eq!(file["restore_backup"], "skip");
}

#[tokio::test]
async fn progress_page_follows_initial_settings() {
    let app = TestApp::new().await;
    app.runner.succeed("docker compose logs", "certbot | waiting\n");
    app.post_form("/", SETTINGS).await;

    let body = body_string(app.get("/").await).await;

    assert!(body.contains("Request Certificates"));
    assert!(body.contains("requested"));
    assert!(body.contains("certbot | waiting"));
}

#[tokio::test]
async fn missing_field_is_rejected_without_running_anything() {
    let app = TestApp::new().await;

    let resp = app
        .post_form("/", "step=generate_env&DOMAIN=app.example.com&ADMIN_USERNAME=admin&ADMIN_PASSWORD=pw")
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(resp).await.contains("AUTH_DOMAIN is required"));
    assert!(app.runner.calls().is_empty());
    assert_eq!(
        app.state.setup.snapshot().status(StepId::GenerateEnv),
        StepStatus::Pending
    );
}

#[tokio::test]
async fn failed_generate_env_shows_setup_log() {
    let app = TestApp::new().await;
    app.runner.fail("make generate-env", "DOMAIN is not resolvable");

    let resp = app.post_form("/", SETTINGS).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let snapshot = app.state.setup.snapshot();
    assert_eq!(snapshot.status(StepId::GenerateEnv), StepStatus::Failed);
    assert_eq!(snapshot.status(StepId::InitCert), StepStatus::Pending);

    let body = body_string(app.get("/").await).await;
    assert!(body.contains("Setup failed"));
    assert!(body.contains("### Initial Settings"));
    assert!(body.contains("DOMAIN is not resolvable"));
}

#[tokio::test]
async fn second_submission_is_ignored() {
    let app = TestApp::new().await;
    app.post_form("/", SETTINGS).await;

    let resp = app.post_form("/", SETTINGS).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.runner.commands(), vec!["make generate-env"]);
}

#[tokio::test]
async fn unknown_or_missing_step_redirects_without_change() {
    let app = TestApp::new().await;

    for body in ["step=reboot", "DOMAIN=x"] {
        let resp = app.post_form("/", body).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    assert!(app.runner.calls().is_empty());
    assert_eq!(
        app.state.setup.snapshot().status(StepId::GenerateEnv),
        StepStatus::Pending
    );
}

#[tokio::test]
async fn later_step_can_be_requested() {
    let app = TestApp::new().await;

    let resp = app.post_form("/", "step=init_keycloak").await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        app.state.setup.snapshot().status(StepId::InitKeycloak),
        StepStatus::Requested
    );
    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn multipart_upload_is_stored_for_restore() {
    let app = TestApp::new().await;
    let boundary = "X-STACKADM-BOUNDARY";
    let mut body = String::new();
    for (name, value) in [
        ("step", "generate_env"),
        ("DOMAIN", "app.example.com"),
        ("AUTH_DOMAIN", "auth.example.com"),
        ("ADMIN_USERNAME", "admin"),
        ("ADMIN_PASSWORD", "pw"),
    ] {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"backup_file\"; filename=\"dump.zip\"\r\n\
         Content-Type: application/zip\r\n\r\nPK-archive-bytes\r\n--{boundary}--\r\n"
    ));

    let req = Request::post("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let resp = app.send(req).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let stored = std::fs::read_to_string(app.path(ProjectLayout::UPLOAD_FILE)).unwrap();
    assert_eq!(stored, "PK-archive-bytes");
    assert!(!app.path("tmp/backup.zip.part").exists());
    assert_eq!(
        app.state.setup.snapshot().restore_backup(),
        Some(RestoreBackup::Uploaded)
    );
    assert_eq!(state_file(&app)["restore_backup"], "uploaded");
}

#[tokio::test]
async fn env_is_reloaded_after_generate_env() {
    let app = TestApp::new().await;
    assert!(app.state.env.admin_credentials().await.is_none());
    // The scripted command does not write .env; stand in for it.
    std::fs::write(
        app.path(ProjectLayout::ENV_FILE),
        "ADMIN_USERNAME=admin\nADMIN_PASSWORD=s3cret\nDOMAIN_NAME=app.example.com\n",
    )
    .unwrap();

    app.post_form("/", SETTINGS).await;

    assert_eq!(
        app.state.env.admin_credentials().await,
        Some(("admin".to_owned(), "s3cret".to_owned()))
    );
}
