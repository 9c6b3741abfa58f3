use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::media::MediaError;
use crate::social::{RepositoryError, SocialError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            // Duplicate usernames are reported as plain validation failures
            AppError::Conflict(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Image storage failed".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AppError::NotFound,
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::Database(e) => AppError::Pool(e),
            RepositoryError::Sql(e) => AppError::Database(e),
        }
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Empty => AppError::BadRequest("empty upload".into()),
            MediaError::UnsupportedType(ext) => {
                AppError::BadRequest(format!("unsupported file type: {}", ext))
            }
            MediaError::Io(e) => AppError::Storage(e.to_string()),
        }
    }
}

impl From<SocialError> for AppError {
    fn from(err: SocialError) -> Self {
        match err {
            SocialError::UsernameTaken => AppError::Conflict(err.to_string()),
            SocialError::InvalidCredentials => {
                tracing::warn!("Rejected login attempt");
                AppError::Unauthorized
            }
            SocialError::AccountNotFound => AppError::NotFound,
            SocialError::CreationFailed(msg) => AppError::Internal(msg),
            SocialError::Repository(e) => e.into(),
            SocialError::Media(e) => e.into(),
            SocialError::Password(e) => AppError::Internal(format!("password hashing: {}", e)),
            SocialError::UsernameRequired
            | SocialError::UsernameTooShort
            | SocialError::InvalidOldPassword
            | SocialError::MissingField(_)
            | SocialError::EmptyPost
            | SocialError::EmptyComment => AppError::BadRequest(err.to_string()),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
