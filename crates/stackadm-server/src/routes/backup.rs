//! Backup management: list, create, delete, download and restore.
//!
//! The page itself is HTML; every action answers JSON
//! `{"success": ..., "message": ...}` for the page's scripts.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Path, Request, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::routes::{ActionResponse, detached};
use crate::state::AppState;
use crate::views;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/backup",
            get(show_backups).post(create_backup).delete(delete_backup),
        )
        .route("/backup/{timestamp}/download", get(download_backup))
        .route("/backup/{timestamp}/restore", post(restore_backup))
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBackupRequest {
    #[serde(default)]
    pub timestamp: Option<String>,
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn show_backups(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    let backups = state.backups.list().await?;
    Ok(Html(views::backups_page(&backups)))
}

/// Accepts a JSON or urlencoded `description`, or no body at all.
async fn create_backup(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Json<ActionResponse>, AppError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let body = if content_type.starts_with("application/json") {
        let bytes = Bytes::from_request(req, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        if bytes.is_empty() {
            CreateBackupRequest::default()
        } else {
            serde_json::from_slice(&bytes)
                .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let axum::Form(form) = axum::Form::<CreateBackupRequest>::from_request(req, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        form
    } else {
        CreateBackupRequest::default()
    };

    let timestamp = detached(async move {
        Ok::<_, AppError>(state.backups.create(body.description.as_deref()).await?)
    })
    .await?;
    Ok(ActionResponse::ok(format!(
        "Backup {timestamp} created successfully"
    )))
}

async fn delete_backup(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ActionResponse>, AppError> {
    let timestamp = serde_json::from_slice::<DeleteBackupRequest>(&body)
        .ok()
        .and_then(|r| r.timestamp)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Timestamp required".to_owned()))?;

    state.backups.delete(timestamp.trim()).await?;
    Ok(ActionResponse::ok("Backup deleted successfully"))
}

/// Stream `dump.zip` as `backup_<timestamp>.zip`.
async fn download_backup(
    State(state): State<Arc<AppState>>,
    Path(timestamp): Path<String>,
) -> Result<Response, AppError> {
    let path = state.backups.dump_path(&timestamp)?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::Internal(format!("failed to open '{}': {e}", path.display())))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(format!("failed to stat '{}': {e}", path.display())))?
        .len();

    let disposition = format!("attachment; filename=\"backup_{timestamp}.zip\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_owned()),
            (header::CONTENT_LENGTH, len.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// Stop containers, take a safety backup, restore, start containers.
async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Path(timestamp): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = detached(async move {
        Ok::<_, AppError>(state
            .backups
            .restore_with_restart(&state.containers, &timestamp)
            .await?)
    })
    .await?;
    Ok(ActionResponse::ok(message))
}
