pub mod auth;
pub mod follow;
pub mod form;
pub mod posts;
pub mod profile;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assembles every endpoint into one router bound to `state`.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(follow::router())
        .merge(profile::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
