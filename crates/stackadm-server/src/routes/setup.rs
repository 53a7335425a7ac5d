//! Setup wizard at `/`.
//!
//! `GET` renders whatever [`SetupView`] the current state maps to. `POST`
//! either submits the initial settings (with an optional backup archive) or
//! requests a later pending step. Every successful `POST` answers
//! `303 See Other` back to `/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use tokio::io::AsyncWriteExt;

use stackadm_core::error::SetupError;
use stackadm_core::runner::InitialSettings;
use stackadm_core::state::RestoreBackup;
use stackadm_core::step::{StepId, StepStatus};
use stackadm_core::view::SetupView;

use crate::error::AppError;
use crate::state::AppState;
use crate::views;

/// Multipart field carrying the optional backup archive.
const BACKUP_FIELD: &str = "backup_file";

/// Build the setup router. The upload has no body limit.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/",
        get(show_setup)
            .post(submit_setup)
            .layer(DefaultBodyLimit::disable()),
    )
}

async fn show_setup(State(state): State<Arc<AppState>>) -> Html<String> {
    let snapshot = state.setup.snapshot();
    let page = match SetupView::resolve(&snapshot) {
        SetupView::InitialForm => views::setup_form_page(),
        SetupView::Progress { step, status } => {
            let logs = state.containers.logs().await;
            views::progress_page(step, status, &logs)
        }
        SetupView::Failed { step } => {
            let log = state.setup_log.read().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to read setup log");
                String::new()
            });
            views::failed_page(step, &log)
        }
        SetupView::Complete => {
            let domain = state.env.get("DOMAIN_NAME").await;
            views::complete_page(domain.as_deref())
        }
    };
    Html(page)
}

/// Fields of a setup `POST`, plus the staged upload if one was sent.
struct SetupForm {
    fields: HashMap<String, String>,
    upload: Option<PathBuf>,
}

impl SetupForm {
    fn field(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    fn settings(&self) -> InitialSettings {
        InitialSettings {
            domain: self.field("DOMAIN"),
            auth_domain: self.field("AUTH_DOMAIN"),
            admin_username: self.field("ADMIN_USERNAME"),
            admin_password: self.field("ADMIN_PASSWORD"),
        }
    }

    async fn discard_upload(&self) {
        if let Some(part) = &self.upload {
            if let Err(e) = tokio::fs::remove_file(part).await {
                tracing::warn!(path = %part.display(), error = %e, "failed to remove staged upload");
            }
        }
    }
}

async fn submit_setup(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, AppError> {
    let form = read_form(&state, req).await?;

    let step = match form.fields.get("step").map(|s| s.parse::<StepId>()) {
        Some(Ok(step)) => step,
        Some(Err(e)) => {
            tracing::debug!(error = %e, "ignoring setup post");
            form.discard_upload().await;
            return Ok(back_to_setup());
        }
        None => {
            form.discard_upload().await;
            return Ok(back_to_setup());
        }
    };

    if step != StepId::GenerateEnv {
        form.discard_upload().await;
        state.setup.request(step).await?;
        return Ok(back_to_setup());
    }

    if state.setup.snapshot().status(step) != StepStatus::Pending {
        form.discard_upload().await;
        return Ok(back_to_setup());
    }

    let settings = form.settings();
    if let Err(e) = settings.validate() {
        form.discard_upload().await;
        return Err(e.into());
    }

    let restore = match &form.upload {
        Some(part) => {
            promote_upload(part, &state.layout.upload_path()).await?;
            RestoreBackup::Uploaded
        }
        None => RestoreBackup::Skip,
    };

    match state.setup.submit_initial_settings(settings, restore).await {
        Ok(run) => {
            if run.status == StepStatus::Done {
                if let Err(e) = state.env.reload().await {
                    tracing::warn!(error = %e, "failed to reload env file after generate_env");
                }
            }
            Ok(back_to_setup())
        }
        Err(SetupError::NotPending { .. }) => Ok(back_to_setup()),
        Err(e) => Err(e.into()),
    }
}

fn back_to_setup() -> Response {
    Redirect::to("/").into_response()
}

/// Read a multipart or urlencoded body. A multipart `backup_file` is
/// streamed to a `.part` file next to the final upload location.
async fn read_form(state: &Arc<AppState>, req: Request) -> Result<SetupForm, AppError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        let axum::Form(fields) = axum::Form::<HashMap<String, String>>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        return Ok(SetupForm {
            fields,
            upload: None,
        });
    }

    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;
    let mut form = SetupForm {
        fields: HashMap::new(),
        upload: None,
    };

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name == BACKUP_FIELD {
            let part = staging_path(&state.layout.upload_path());
            if let Some(parent) = part.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| upload_err(&part, &e))?;
            }
            let mut file = tokio::fs::File::create(&part)
                .await
                .map_err(|e| upload_err(&part, &e))?;
            let mut written: u64 = 0;
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?
            {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| upload_err(&part, &e))?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| upload_err(&part, &e))?;
            drop(file);

            if written == 0 {
                // An empty file input still sends the field.
                let _ = tokio::fs::remove_file(&part).await;
            } else {
                tracing::info!(bytes = written, "backup archive uploaded");
                form.upload = Some(part);
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

fn staging_path(upload: &Path) -> PathBuf {
    let mut part = upload.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

async fn promote_upload(part: &Path, upload: &Path) -> Result<(), AppError> {
    tokio::fs::rename(part, upload)
        .await
        .map_err(|e| upload_err(upload, &e))
}

fn upload_err(path: &Path, e: &std::io::Error) -> AppError {
    AppError::Internal(format!(
        "failed to store uploaded backup at '{}': {e}",
        path.display()
    ))
}
