use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::form::NewPostForm;
use crate::social::domain::{validate_comment_text, validate_post_text, ActionKind};
use crate::social::profile::discard;
use crate::social::{
    AccountRepository, PostRepository, SqliteAccountRepository, SqlitePostRepository,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/create", post(create_post))
        .route("/posts/{id}/like", post(like))
        .route("/posts/{id}/repost", post(repost))
        .route("/posts/{id}/share", post(share))
        .route("/posts/{id}/comment", post(add_comment))
        .route("/posts/{id}/comments", get(list_comments))
        .route("/posts/{id}/actions", get(list_actions))
        .route("/feed", get(feed))
        .route("/users/{username}/posts", get(user_posts))
}

fn posts_repo(state: &AppState) -> SqlitePostRepository {
    SqlitePostRepository::new(state.db.clone())
}

/// GET /posts
async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let posts = posts_repo(&state).list_all().await?;
    Ok(Json(json!({ "posts": posts })))
}

/// POST /posts/create
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    form: NewPostForm,
) -> AppResult<impl IntoResponse> {
    let text = validate_post_text(form.text.as_deref(), form.image.is_some())?;

    let image_url = match form.image {
        Some(upload) => Some(state.media.store_image(&upload.data, &upload.filename).await?),
        None => None,
    };

    let post = match posts_repo(&state)
        .create(&user.id, &text, image_url.as_deref())
        .await
    {
        Ok(post) => post,
        Err(e) => {
            tracing::error!("Failed to create post for {}: {}", user.username, e);
            if let Some(url) = image_url {
                discard(state.media.as_ref(), &[url]).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!("Post {} created by {}", post.id, user.username);
    Ok((StatusCode::CREATED, Json(json!({ "post": post }))))
}

async fn toggle(
    state: &AppState,
    user: &CurrentUser,
    post_id: &str,
    kind: ActionKind,
) -> AppResult<Json<Value>> {
    let outcome = posts_repo(state).toggle_action(&user.id, post_id, kind).await?;

    let mut body = Map::new();
    body.insert(kind.counter_column().to_string(), json!(outcome.count));
    body.insert("id".to_string(), json!(post_id));
    body.insert("active".to_string(), json!(outcome.active));
    Ok(Json(Value::Object(body)))
}

/// POST /posts/{id}/like
async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    toggle(&state, &user, &id, ActionKind::Like).await
}

/// POST /posts/{id}/repost
async fn repost(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    toggle(&state, &user, &id, ActionKind::Repost).await
}

/// POST /posts/{id}/share
async fn share(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    toggle(&state, &user, &id, ActionKind::Share).await
}

#[derive(Deserialize)]
struct CommentBody {
    text: Option<String>,
}

/// POST /posts/{id}/comment
async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> AppResult<impl IntoResponse> {
    let body: CommentBody = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON: {}", e)))?;
    let text = validate_comment_text(body.text.as_deref())?;

    let (comment, comments_count) = posts_repo(&state)
        .add_comment(&user.id, &id, &text)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "comment": comment, "comments_count": comments_count })),
    ))
}

/// GET /posts/{id}/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let comments = posts_repo(&state).list_comments(&id).await?;
    Ok(Json(json!({ "comments": comments })))
}

/// GET /posts/{id}/actions
async fn list_actions(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let kinds = posts_repo(&state).actions_for(&user.id, &id).await?;
    let actions: Vec<Value> = kinds
        .into_iter()
        .map(|kind| json!({ "action_type": kind }))
        .collect();
    Ok(Json(json!({ "actions": actions })))
}

/// GET /feed
async fn feed(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Value>> {
    let posts = posts_repo(&state).list_following(&user.id).await?;
    Ok(Json(json!({ "posts": posts })))
}

/// GET /users/{username}/posts
async fn user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<Value>> {
    let author = SqliteAccountRepository::new(state.db.clone())
        .find_by_username(&username)
        .await?
        .ok_or(AppError::NotFound)?;
    let posts = posts_repo(&state).list_by_author(&author.id).await?;
    Ok(Json(json!({ "posts": posts })))
}
