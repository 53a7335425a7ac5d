//! Aggregated `docker compose logs`.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;

use crate::state::AppState;
use crate::views;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/logs", get(show_logs))
        .route("/logs/download", get(download_logs))
}

async fn show_logs(State(state): State<Arc<AppState>>) -> Html<String> {
    let logs = state.containers.logs().await;
    Html(views::logs_page(&logs))
}

async fn download_logs(State(state): State<Arc<AppState>>) -> Response {
    let logs = state.containers.logs().await;
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"stack-logs.txt\"",
            ),
        ],
        logs,
    )
        .into_response()
}
