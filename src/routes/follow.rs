use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::social::{AccountRepository, SqliteAccountRepository};
use crate::state::AppState;

/// Anonymous visitors only see this many suggestions.
const ANONYMOUS_SUGGESTIONS: u32 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/follow/{user_id}", post(toggle_follow))
        .route("/suggestions", get(suggestions))
}

/// POST /follow/{user_id}
async fn toggle_follow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(target_id): Path<String>,
) -> AppResult<Json<Value>> {
    let outcome = SqliteAccountRepository::new(state.db.clone())
        .toggle_follow(&user.id, &target_id)
        .await?;

    tracing::info!(
        "{} {} {}",
        user.username,
        if outcome.following { "followed" } else { "unfollowed" },
        target_id
    );
    Ok(Json(json!({
        "status": "updated",
        "following": outcome.following,
        "following_count": outcome.following_count,
    })))
}

/// GET /suggestions
async fn suggestions(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<Value>> {
    let repo = SqliteAccountRepository::new(state.db.clone());
    let users = match &user {
        Some(user) => repo.suggestions(Some(&user.id), None).await?,
        None => repo.suggestions(None, Some(ANONYMOUS_SUGGESTIONS)).await?,
    };
    Ok(Json(json!({ "suggestions": users })))
}
