use axum::extract::State;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::form::ProfilePatchForm;
use crate::social::profile::{profile_details, update_profile};
use crate::social::{PostRepository, SqliteAccountRepository, SqlitePostRepository};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(show))
        .route("/profile/posts", get(own_posts))
        .route("/profile/update", patch(update))
}

/// GET /profile
async fn show(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let accounts = SqliteAccountRepository::new(state.db.clone());
    let posts = SqlitePostRepository::new(state.db.clone());
    let details = profile_details(&accounts, &posts, &user.id).await?;
    Ok(Json(json!(details)))
}

/// GET /profile/posts
async fn own_posts(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let posts = SqlitePostRepository::new(state.db.clone())
        .list_by_author(&user.id)
        .await?;
    Ok(Json(json!({ "posts": posts })))
}

/// PATCH /profile/update
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    ProfilePatchForm(patch): ProfilePatchForm,
) -> AppResult<Json<Value>> {
    let accounts = SqliteAccountRepository::new(state.db.clone());
    let view = update_profile(
        &accounts,
        state.media.as_ref(),
        &user.id,
        patch,
        state.config.auth.bcrypt_cost,
    )
    .await?;

    let mut body = serde_json::to_value(&view).map_err(|e| AppError::Internal(e.to_string()))?;
    if let Value::Object(map) = &mut body {
        map.insert("status".to_string(), json!("success"));
    }
    Ok(Json(body))
}
