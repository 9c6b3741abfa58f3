use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::identity::{self, Credentials, Registration};
use crate::auth::session;
use crate::db::models::Account;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::social::SqliteAccountRepository;
use crate::state::AppState;

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// Opens a session and answers with the token in both the body and a cookie.
fn signed_in(state: &AppState, account: &Account, status: StatusCode) -> AppResult<Response> {
    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, &account.id, hours)?;
    let cookie = session_cookie(&state.config.auth.cookie_name, &token, hours);

    let body = json!({
        "status": "success",
        "id": account.id,
        "username": account.username,
        "token": token,
    });

    Ok((status, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid JSON: {}", e)))
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> AppResult<Response> {
    let registration: Registration = parse_json(&body)?;
    let repo = SqliteAccountRepository::new(state.db.clone());

    let account = identity::register(&repo, registration, state.config.auth.bcrypt_cost).await?;
    signed_in(&state, &account, StatusCode::CREATED)
}

/// POST /login
pub async fn login(State(state): State<AppState>, body: axum::body::Bytes) -> AppResult<Response> {
    let credentials: Credentials = parse_json(&body)?;
    let repo = SqliteAccountRepository::new(state.db.clone());

    let account = identity::authenticate(&repo, credentials).await?;
    tracing::info!("Login: {}", account.username);
    signed_in(&state, &account, StatusCode::OK)
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    session::delete_session(&state.db, &user.token)?;
    tracing::info!("Logout: {}", user.username);

    let cookie = clear_session_cookie(&state.config.auth.cookie_name);
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "status": "success" })),
    )
        .into_response())
}
