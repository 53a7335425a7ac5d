//! Component versions: compare `.env` against the versions API and upgrade.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;

use crate::error::AppError;
use crate::routes::{ActionResponse, detached};
use crate::state::AppState;
use crate::views;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/versions", get(show_versions).put(update_versions))
}

async fn show_versions(State(state): State<Arc<AppState>>) -> Html<String> {
    let rows = state.versions.check().await;
    Html(views::versions_page(&rows))
}

/// Write every newer version into `.env` and restart the containers.
async fn update_versions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = detached(async move { Ok::<_, AppError>(state.versions.apply_update().await?) })
        .await?;
    Ok(ActionResponse::ok(message))
}
