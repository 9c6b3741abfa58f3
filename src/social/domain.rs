// Domain types - pure values and validation, no I/O
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::models::Account;
use crate::media::MediaError;
use crate::social::repository::RepositoryError;

pub const MIN_USERNAME_LEN: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("username required")]
    UsernameRequired,

    #[error("username too short")]
    UsernameTooShort,

    #[error("username taken")]
    UsernameTaken,

    #[error("invalid old password")]
    InvalidOldPassword,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("post needs text or an image")]
    EmptyPost,

    #[error("comment text required")]
    EmptyComment,

    #[error("account not found")]
    AccountNotFound,

    #[error("creation failed: {0}")]
    CreationFailed(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("password hashing failed: {0}")]
    Password(#[from] bcrypt::BcryptError),
}

/// Engagement kinds tracked by the action ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Like,
    Repost,
    Share,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [ActionKind::Like, ActionKind::Repost, ActionKind::Share];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Like => "like",
            ActionKind::Repost => "repost",
            ActionKind::Share => "share",
        }
    }

    /// Counter column on `posts`; also the JSON key of toggle responses.
    pub fn counter_column(&self) -> &'static str {
        match self {
            ActionKind::Like => "likes_count",
            ActionKind::Repost => "reposts_count",
            ActionKind::Share => "shares_count",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(ActionKind::Like),
            "repost" => Ok(ActionKind::Repost),
            "share" => Ok(ActionKind::Share),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

/// Post as returned by every listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    pub id: String,
    pub text: String,
    pub author: String,
    pub author_id: String,
    pub likes_count: i64,
    pub reposts_count: i64,
    pub comments_count: i64,
    pub shares_count: i64,
    /// Empty string when the post has no image
    pub image: String,
    pub created_at: String,
}

impl PostView {
    pub fn count_for(&self, kind: ActionKind) -> i64 {
        match kind {
            ActionKind::Like => self.likes_count,
            ActionKind::Repost => self.reposts_count,
            ActionKind::Share => self.shares_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub text: String,
    pub author: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

/// Result of a ledger toggle: `active` is whether the action exists afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub kind: ActionKind,
    pub active: bool,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowOutcome {
    pub following: bool,
    pub following_count: i64,
}

/// Profile returned after an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub bio: String,
    pub location: String,
    pub profile_picture: String,
    pub cover_image: String,
}

impl From<&Account> for ProfileView {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            bio: account.bio.clone().unwrap_or_default(),
            location: account.location.clone().unwrap_or_default(),
            profile_picture: account.avatar_url.clone().unwrap_or_default(),
            cover_image: account.cover_url.clone().unwrap_or_default(),
        }
    }
}

/// Full profile page for the signed-in account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDetails {
    pub id: String,
    pub username: String,
    pub handle: String,
    pub email: String,
    pub bio: String,
    pub location: String,
    pub profile_picture: String,
    pub cover_image: String,
    pub followers: i64,
    pub following_count: i64,
    pub posts_count: i64,
    pub following: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

/// What to do with a stored image reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageChange {
    #[default]
    Keep,
    Replace(ImageUpload),
    Remove,
}

impl ImageChange {
    /// An upload wins over the removal flag.
    pub fn from_parts(upload: Option<ImageUpload>, remove: bool) -> Self {
        match upload {
            Some(upload) => ImageChange::Replace(upload),
            None if remove => ImageChange::Remove,
            None => ImageChange::Keep,
        }
    }
}

/// Normalized profile update, independent of the request encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar: ImageChange,
    pub cover: ImageChange,
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

/// Checks presence and length; returns the trimmed username.
pub fn validate_username(raw: Option<&str>) -> Result<String, SocialError> {
    let username = raw.map(str::trim).unwrap_or_default();
    if username.is_empty() {
        return Err(SocialError::UsernameRequired);
    }
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(SocialError::UsernameTooShort);
    }
    Ok(username.to_string())
}

/// Blank secrets count as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub fn validate_post_text(text: Option<&str>, has_image: bool) -> Result<String, SocialError> {
    let text = text.map(str::trim).unwrap_or_default();
    if text.is_empty() && !has_image {
        return Err(SocialError::EmptyPost);
    }
    Ok(text.to_string())
}

pub fn validate_comment_text(text: Option<&str>) -> Result<String, SocialError> {
    match text.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(SocialError::EmptyComment),
    }
}
