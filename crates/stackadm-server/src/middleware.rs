//! Session gate for the console.
//!
//! Until `ADMIN_USERNAME` and `ADMIN_PASSWORD` exist in `.env` every page is
//! open, since the setup wizard is what creates them. Afterwards a request
//! passes with a valid `stackadm_session` cookie or with HTTP Basic
//! credentials (which also open a session). Anything else is redirected to
//! `/login`.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::state::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "stackadm_session";

/// Paths reachable without a session.
const PUBLIC_PATHS: [&str; 3] = ["/", "/login", "/health"];

/// In-memory set of live session ids. Sessions end with the process.
#[derive(Debug, Default)]
pub struct SessionStore {
    ids: RwLock<HashSet<Uuid>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.ids.write().await.insert(id);
        id
    }

    pub async fn contains(&self, id: &str) -> bool {
        match Uuid::parse_str(id) {
            Ok(id) => self.ids.read().await.contains(&id),
            Err(_) => false,
        }
    }

    pub async fn remove(&self, id: &str) {
        if let Ok(id) = Uuid::parse_str(id) {
            self.ids.write().await.remove(&id);
        }
    }
}

/// `Set-Cookie` value opening session `id`.
pub fn session_cookie(id: Uuid) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value dropping the session cookie.
pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

/// Value of the session cookie, if the request carries one.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_owned())
}

/// Whether the request's session cookie names a live session.
pub async fn has_session(sessions: &SessionStore, headers: &HeaderMap) -> bool {
    match session_id(headers) {
        Some(id) => sessions.contains(&id).await,
        None => false,
    }
}

/// Constant-time comparison of both username and password.
pub fn credentials_match(expected: &(String, String), username: &str, password: &str) -> bool {
    let user_ok = username.as_bytes().ct_eq(expected.0.as_bytes());
    let pass_ok = password.as_bytes().ct_eq(expected.1.as_bytes());
    (user_ok & pass_ok).into()
}

/// Username and password from an `Authorization: Basic` header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_owned(), pass.to_owned()))
}

/// A redirect target that cannot leave this host.
///
/// Accepts relative paths with a single leading `/`, and `http(s)` URLs
/// whose authority equals `host`. Trailing `?` are dropped. Anything else
/// becomes `/`.
pub fn safe_next_url(candidate: Option<&str>, host: Option<&str>) -> String {
    let target = candidate.unwrap_or("/").trim_end_matches('?');

    if target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\") {
        return target.to_owned();
    }

    let rest = target
        .strip_prefix("http://")
        .or_else(|| target.strip_prefix("https://"));
    if let (Some(rest), Some(host)) = (rest, host) {
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if !authority.is_empty() && authority.eq_ignore_ascii_case(host) {
            return target.to_owned();
        }
    }

    "/".to_owned()
}

/// `/login?next=<target>` for a request that failed the gate.
fn login_redirect(req: &Request) -> Redirect {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok());
    let candidate = if req.method() == Method::GET {
        req.uri().path_and_query().map(|pq| pq.as_str().to_owned())
    } else {
        req.headers()
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let next = safe_next_url(candidate.as_deref(), host);
    Redirect::to(&format!("/login?next={}", urlencoding::encode(&next)))
}

/// Middleware enforcing the session gate.
pub async fn auth_gate(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let Some(expected) = state.env.admin_credentials().await else {
        return next.run(req).await;
    };

    if has_session(&state.sessions, req.headers()).await {
        return next.run(req).await;
    }

    if let Some((user, pass)) = basic_credentials(req.headers()) {
        if credentials_match(&expected, &user, &pass) {
            let id = state.sessions.create().await;
            tracing::info!(username = %user, "session opened via basic auth");
            let mut resp = next.run(req).await;
            if let Ok(cookie) = HeaderValue::from_str(&session_cookie(id)) {
                resp.headers_mut().append(header::SET_COOKIE, cookie);
            }
            return resp;
        }
        tracing::warn!(username = %user, "basic auth rejected");
    }

    login_redirect(&req).into_response()
}
