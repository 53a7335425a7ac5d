//! Console login and logout.
//!
//! Credentials are `ADMIN_USERNAME` / `ADMIN_PASSWORD` from `.env`. While
//! they are absent the console is open and `/login` just sends the operator
//! to `/`.

use std::sync::Arc;

use axum::Form;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Deserialize;

use crate::middleware::{
    credentials_match, expired_session_cookie, has_session, safe_next_url, session_cookie,
    session_id,
};
use crate::state::AppState;
use crate::views::{self, Flash};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub next_url: Option<String>,
}

fn host(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::HOST).and_then(|v| v.to_str().ok())
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn login_form(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Response {
    if state.env.admin_credentials().await.is_none() {
        return Redirect::to("/").into_response();
    }

    let next = safe_next_url(query.next.as_deref(), host(&headers));
    if has_session(&state.sessions, &headers).await {
        return Redirect::to(&next).into_response();
    }

    Html(views::login_page(&next, &[])).into_response()
}

async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginRequest>,
) -> Response {
    let Some(expected) = state.env.admin_credentials().await else {
        return Redirect::to("/").into_response();
    };

    let next = safe_next_url(form.next_url.as_deref(), host(&headers));
    let username = form.username.trim();

    if !credentials_match(&expected, username, &form.password) {
        tracing::warn!(%username, "login rejected");
        let page = views::login_page(&next, &[Flash::error("Invalid username or password.")]);
        return (StatusCode::UNAUTHORIZED, Html(page)).into_response();
    }

    let id = state.sessions.create().await;
    tracing::info!(%username, "session opened");
    (
        [(header::SET_COOKIE, session_cookie(id))],
        Redirect::to(&next),
    )
        .into_response()
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.remove(&id).await;
        tracing::info!("session closed");
    }
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}
