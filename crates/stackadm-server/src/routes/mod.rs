//! HTTP route handlers for `stackadm`.
//!
//! Routes are organized by page:
//! - `setup`: the setup wizard at `/`
//! - `versions`: component versions and bulk update
//! - `backup`: list, create, delete, download and restore backups
//! - `logs`: container logs
//! - `keycloak`: identity-provider users
//! - `auth`: login and logout
//! - `health`: liveness probe

pub mod auth;
pub mod backup;
pub mod health;
pub mod keycloak;
pub mod logs;
pub mod setup;
pub mod versions;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware as axum_mw;
use serde::Serialize;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::auth_gate;
use crate::state::AppState;

/// JSON body of a successful console action.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> axum::Json<Self> {
        axum::Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Run a container maintenance sequence on its own task.
///
/// Hyper drops the handler future when the client disconnects. The sequence
/// must still reach its final `make up`, so it is never polled from the
/// request itself.
pub(crate) async fn detached<T, F>(work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(format!("maintenance task failed: {e}")))?
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(setup::router())
        .merge(versions::router())
        .merge(backup::router())
        .merge(logs::router())
        .merge(keycloak::router())
        .merge(auth::router())
        .merge(health::router())
        .layer(axum_mw::from_fn_with_state(Arc::clone(&state), auth_gate))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
