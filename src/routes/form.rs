//! Request-body normalization.
//!
//! Endpoints that accept uploads take either `application/json` or
//! `multipart/form-data`. Each extractor here parses one of the two shapes
//! into the same domain value, so handlers never branch on encoding.

use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::social::domain::{non_empty, ImageChange, ImageUpload, ProfilePatch};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Multipart,
}

pub fn body_kind(headers: &HeaderMap) -> Result<BodyKind, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "application/json" => Ok(BodyKind::Json),
        "multipart/form-data" => Ok(BodyKind::Multipart),
        _ => {
            tracing::warn!("Unsupported content type: {:?}", content_type);
            Err(AppError::UnsupportedMediaType(
                "expected application/json or multipart/form-data".into(),
            ))
        }
    }
}

/// Text fields and non-empty file parts of a multipart body.
#[derive(Debug, Default)]
pub struct FormParts {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, ImageUpload>,
}

impl FormParts {
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    /// HTML-form style boolean: "true"/"1"/"on" are true.
    pub fn flag(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on"))
            .unwrap_or(false)
    }

    pub fn take_file(&mut self, name: &str) -> Option<ImageUpload> {
        self.files.remove(name)
    }
}

fn form_error(e: impl std::fmt::Display) -> AppError {
    tracing::warn!("Failed to read multipart body: {}", e);
    AppError::BadRequest(format!("invalid form data: {}", e))
}

pub async fn read_multipart(req: Request, state: &AppState) -> Result<FormParts, AppError> {
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    let mut parts = FormParts::default();
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let data = field.bytes().await.map_err(form_error)?;
                // Browsers send an empty part when no file was picked
                if !data.is_empty() {
                    parts.files.insert(
                        name,
                        ImageUpload {
                            filename,
                            data: data.to_vec(),
                        },
                    );
                }
            }
            None => {
                let text = field.text().await.map_err(form_error)?;
                parts.fields.insert(name, text);
            }
        }
    }
    Ok(parts)
}

pub async fn read_json<T: serde::de::DeserializeOwned>(
    req: Request,
    state: &AppState,
) -> Result<T, AppError> {
    let Json(value) = Json::<T>::from_request(req, state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;
    Ok(value)
}

// -- Profile update --

#[derive(Debug, Default, Deserialize)]
struct ProfileJson {
    username: Option<String>,
    bio: Option<String>,
    location: Option<String>,
    old_password: Option<String>,
    new_password: Option<String>,
    #[serde(default)]
    remove_profile_picture: bool,
    #[serde(default)]
    remove_cover_image: bool,
}

impl From<ProfileJson> for ProfilePatch {
    fn from(body: ProfileJson) -> Self {
        ProfilePatch {
            username: body.username,
            bio: body.bio,
            location: body.location,
            avatar: ImageChange::from_parts(None, body.remove_profile_picture),
            cover: ImageChange::from_parts(None, body.remove_cover_image),
            old_password: non_empty(body.old_password),
            new_password: non_empty(body.new_password),
        }
    }
}

impl From<FormParts> for ProfilePatch {
    fn from(mut form: FormParts) -> Self {
        let avatar = form.take_file("profile_picture");
        let cover = form.take_file("cover_image");
        ProfilePatch {
            username: form.text("username"),
            bio: form.text("bio"),
            location: form.text("location"),
            avatar: ImageChange::from_parts(avatar, form.flag("remove_profile_picture")),
            cover: ImageChange::from_parts(cover, form.flag("remove_cover_image")),
            old_password: non_empty(form.text("old_password")),
            new_password: non_empty(form.text("new_password")),
        }
    }
}

/// Profile patch parsed from JSON or multipart.
pub struct ProfilePatchForm(pub ProfilePatch);

impl FromRequest<AppState> for ProfilePatchForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let patch = match body_kind(req.headers())? {
            BodyKind::Json => read_json::<ProfileJson>(req, state).await?.into(),
            BodyKind::Multipart => read_multipart(req, state).await?.into(),
        };
        Ok(ProfilePatchForm(patch))
    }
}

// -- Post creation --

#[derive(Debug, Default, Deserialize)]
struct PostJson {
    text: Option<String>,
}

/// New post body: text plus an optional image (multipart only).
#[derive(Debug, Default)]
pub struct NewPostForm {
    pub text: Option<String>,
    pub image: Option<ImageUpload>,
}

impl FromRequest<AppState> for NewPostForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        match body_kind(req.headers())? {
            BodyKind::Json => {
                let body: PostJson = read_json(req, state).await?;
                Ok(NewPostForm {
                    text: body.text,
                    image: None,
                })
            }
            BodyKind::Multipart => {
                let mut form = read_multipart(req, state).await?;
                Ok(NewPostForm {
                    image: form.take_file("image"),
                    text: form.text("text"),
                })
            }
        }
    }
}
