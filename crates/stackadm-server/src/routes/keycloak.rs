//! Identity-provider users: list and add through the `make` targets.

use std::sync::Arc;

use axum::Form;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;
use crate::views::{self, Flash};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/keycloak/add-user", get(show_users).post(add_user))
}

#[derive(Deserialize)]
pub struct AddUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

async fn show_users(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render(&state, "", &[]).await)
}

/// Add a user, then show the list again with the outcome on top. The form
/// keeps the username only when adding failed.
async fn add_user(
    State(state): State<Arc<AppState>>,
    Form(form): Form<AddUserRequest>,
) -> Response {
    match state.keycloak.add_user(&form.username, &form.password).await {
        Ok(output) => {
            let mut flashes = vec![Flash::success("User created.")];
            if !output.is_empty() {
                flashes.push(Flash::success(output));
            }
            Html(render(&state, "", &flashes).await).into_response()
        }
        Err(e) => {
            let err = AppError::from(e);
            let status = err.status();
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!(error = %err.message(), "failed to add keycloak user");
            }
            let page = render(&state, form.username.trim(), &[Flash::error(err.message())]).await;
            (status, Html(page)).into_response()
        }
    }
}

async fn render(state: &AppState, username: &str, flashes: &[Flash]) -> String {
    match state.keycloak.list_users().await {
        Ok(users) => views::keycloak_page(username, Ok(users.as_slice()), flashes),
        Err(e) => {
            tracing::warn!(error = %e, "failed to list keycloak users");
            views::keycloak_page(username, Err(e.to_string().as_str()), flashes)
        }
    }
}
