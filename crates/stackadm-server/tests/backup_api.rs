//! Integration tests for `/backup`.

#![allow(clippy::unwrap_used)]

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{TestApp, body_json, body_string};
use http_body_util::BodyExt;

fn seed_backup(app: &TestApp, ts: &str, description: Option<&str>) {
    let dir = app.path("dumps").join(ts);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("dump.zip"), format!("zip-{ts}")).unwrap();
    if let Some(text) = description {
        std::fs::write(dir.join("description.txt"), text).unwrap();
    }
}

#[tokio::test]
async fn list_shows_only_directories_with_a_dump() {
    let app = TestApp::new().await;
    seed_backup(&app, "20240101000000", Some("before upgrade"));
    std::fs::create_dir_all(app.path("dumps/20240102000000")).unwrap();

    let resp = app.get("/backup").await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains("20240101000000"));
    assert!(body.contains("before upgrade"));
    assert!(!body.contains("20240102000000"));
}

#[tokio::test]
async fn empty_backup_dir_lists_nothing() {
    let app = TestApp::new().await;

    let body = body_string(app.get("/backup").await).await;

    assert!(body.contains("No backups yet."));
}

#[tokio::test]
async fn create_runs_make_backup_with_description() {
    let app = TestApp::new().await;

    let resp = app
        .send_json("POST", "/backup", r#"{"description":"nightly"}"#)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);

    let commands = app.runner.commands();
    assert_eq!(commands.len(), 1);
    let ts = commands[0].strip_prefix("make backup TIMESTAMP=").unwrap();
    let description =
        std::fs::read_to_string(app.path("dumps").join(ts).join("description.txt")).unwrap();
    assert_eq!(description, "nightly");
}

#[tokio::test]
async fn create_failure_is_500() {
    let app = TestApp::new().await;
    app.runner.fail("make backup", "pg_dump: connection refused");

    let resp = app.send(Request::post("/backup").body(Body::empty()).unwrap()).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(resp).await;
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn delete_requires_a_timestamp() {
    let app = TestApp::new().await;

    for body in ["{}", "", r#"{"timestamp":""}"#] {
        let resp = app.send_json("DELETE", "/backup", body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Timestamp required");
    }
}

#[tokio::test]
async fn delete_unknown_backup_is_404() {
    let app = TestApp::new().await;

    let resp = app
        .send_json("DELETE", "/backup", r#"{"timestamp":"20990101000000"}"#)
        .await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["success"], false);
}

#[tokio::test]
async fn delete_removes_the_directory() {
    let app = TestApp::new().await;
    seed_backup(&app, "20240101000000", None);

    let resp = app
        .send_json("DELETE", "/backup", r#"{"timestamp":"20240101000000"}"#)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "Backup deleted successfully");
    assert!(!app.path("dumps/20240101000000").exists());
}

#[tokio::test]
async fn path_traversal_is_rejected() {
    let app = TestApp::new().await;

    let resp = app
        .send_json("DELETE", "/backup", r#"{"timestamp":"../tmp"}"#)
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_serves_dump_as_attachment() {
    let app = TestApp::new().await;
    seed_backup(&app, "20240101000000", None);

    let resp = app.get("/backup/20240101000000/download").await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"backup_20240101000000.zip\""
    );
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"zip-20240101000000");
}

#[tokio::test]
async fn download_unknown_backup_is_404() {
    let app = TestApp::new().await;

    let resp = app.get("/backup/20990101000000/download").await;

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn restore_stops_backs_up_restores_and_starts() {
    let app = TestApp::new().await;
    seed_backup(&app, "20240101000000", None);

    let resp = app
        .send(
            Request::post("/backup/20240101000000/restore")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(
        json["message"],
        "Backup 20240101000000 restored successfully. Containers stopped, backup restored, and containers restarted."
    );

    let commands = app.runner.commands();
    assert_eq!(commands.len(), 4);
    assert_eq!(commands[0], "make down");
    assert!(commands[1].starts_with("make backup TIMESTAMP="));
    assert_eq!(commands[2], "make restore TIMESTAMP=20240101000000");
    assert_eq!(commands[3], "make up");
}

#[tokio::test]
async fn restore_completes_after_the_client_disconnects() {
    let app = TestApp::new().await;
    seed_backup(&app, "20240101000000", None);
    app.runner.delay("make restore", Duration::from_millis(200));

    let req = Request::post("/backup/20240101000000/restore")
        .body(Body::empty())
        .unwrap();
    // Dropping the request future is what hyper does on disconnect.
    let dropped = tokio::time::timeout(Duration::from_millis(50), app.send(req)).await;
    assert!(dropped.is_err());

    for _ in 0..40 {
        if app.runner.commands().last().map(String::as_str) == Some("make up") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let commands = app.runner.commands();
    assert_eq!(commands[2], "make restore TIMESTAMP=20240101000000");
    assert_eq!(commands.last().map(String::as_str), Some("make up"));
}

#[tokio::test]
async fn failed_restore_and_failed_recovery_are_both_reported() {
    let app = TestApp::new().await;
    seed_backup(&app, "20240101000000", None);
    app.runner.fail("make restore", "archive is corrupt");
    app.runner.fail("make up", "docker daemon not running");

    let resp = app
        .send(
            Request::post("/backup/20240101000000/restore")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let message = body_json(resp).await["message"].as_str().unwrap().to_owned();
    assert!(message.starts_with("Restore failed: "));
    assert!(message.contains("archive is corrupt"));
    assert!(message.contains("Additionally, failed to restart containers: "));
    assert!(message.contains("docker daemon not running"));
}
