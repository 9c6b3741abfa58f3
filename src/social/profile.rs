//! Profile reads and validated profile updates.
//!
//! Validation runs completely before anything is written. Images are stored
//! next, then the account row is updated in a single statement; if that
//! fails the freshly stored images are removed again.

use crate::auth::password::{hash_password, verify_password};
use crate::media::MediaStore;
use crate::social::accounts::{AccountRepository, AccountUpdate};
use crate::social::domain::{
    non_empty, validate_username, ImageChange, ProfileDetails, ProfilePatch, ProfileView,
    SocialError,
};
use crate::social::posts::PostRepository;
use crate::social::repository::RepositoryError;

pub async fn profile_details(
    accounts: &dyn AccountRepository,
    posts: &dyn PostRepository,
    account_id: &str,
) -> Result<ProfileDetails, SocialError> {
    let account = accounts
        .find_by_id(account_id)
        .await?
        .ok_or(SocialError::AccountNotFound)?;
    let following = accounts.following_ids(account_id).await?;
    let followers = accounts.follower_count(account_id).await?;
    let posts_count = posts.count_by_author(account_id).await?;

    Ok(ProfileDetails {
        handle: account.username.to_lowercase(),
        id: account.id,
        username: account.username,
        email: account.email,
        bio: account.bio.unwrap_or_default(),
        location: account.location.unwrap_or_default(),
        profile_picture: account.avatar_url.unwrap_or_default(),
        cover_image: account.cover_url.unwrap_or_default(),
        followers,
        following_count: following.len() as i64,
        posts_count,
        following,
    })
}

pub async fn update_profile(
    accounts: &dyn AccountRepository,
    media: &dyn MediaStore,
    account_id: &str,
    patch: ProfilePatch,
    bcrypt_cost: u32,
) -> Result<ProfileView, SocialError> {
    let current = accounts
        .find_by_id(account_id)
        .await?
        .ok_or(SocialError::AccountNotFound)?;

    let username = validate_username(patch.username.as_deref())?;
    if username != current.username
        && accounts
            .username_taken(&username, Some(&current.id))
            .await?
    {
        return Err(SocialError::UsernameTaken);
    }

    let password_hash = match non_empty(patch.new_password) {
        Some(new_password) => match non_empty(patch.old_password) {
            Some(ref old) if verify_password(old, &current.password_hash) => {
                Some(hash_password(&new_password, bcrypt_cost)?)
            }
            _ => {
                tracing::warn!("Profile update for {} with invalid old password", current.username);
                return Err(SocialError::InvalidOldPassword);
            }
        },
        None => None,
    };

    let mut stored = Vec::new();
    let avatar_url =
        match apply_image(media, patch.avatar, current.avatar_url.clone(), &mut stored).await {
            Ok(url) => url,
            Err(e) => {
                discard(media, &stored).await;
                return Err(e);
            }
        };
    let cover_url =
        match apply_image(media, patch.cover, current.cover_url.clone(), &mut stored).await {
            Ok(url) => url,
            Err(e) => {
                discard(media, &stored).await;
                return Err(e);
            }
        };

    let update = AccountUpdate {
        username,
        bio: patch.bio.or(current.bio),
        location: patch.location.or(current.location),
        avatar_url,
        cover_url,
        password_hash,
    };

    match accounts.update(&current.id, &update).await {
        Ok(account) => {
            tracing::info!("Profile updated for {}", account.username);
            // Replaced or cleared images are no longer referenced
            let superseded: Vec<String> = [
                (current.avatar_url, &account.avatar_url),
                (current.cover_url, &account.cover_url),
            ]
            .into_iter()
            .filter_map(|(old, new)| old.filter(|url| Some(url) != new.as_ref()))
            .collect();
            discard(media, &superseded).await;
            Ok(ProfileView::from(&account))
        }
        Err(e) => {
            discard(media, &stored).await;
            Err(match e {
                RepositoryError::Conflict(_) => SocialError::UsernameTaken,
                other => other.into(),
            })
        }
    }
}

async fn apply_image(
    media: &dyn MediaStore,
    change: ImageChange,
    existing: Option<String>,
    stored: &mut Vec<String>,
) -> Result<Option<String>, SocialError> {
    match change {
        ImageChange::Keep => Ok(existing),
        ImageChange::Remove => Ok(None),
        ImageChange::Replace(upload) => {
            let url = media.store_image(&upload.data, &upload.filename).await?;
            stored.push(url.clone());
            Ok(Some(url))
        }
    }
}

/// Best-effort removal of images nothing references any more.
pub(crate) async fn discard(media: &dyn MediaStore, urls: &[String]) {
    for url in urls {
        if let Err(e) = media.remove_image(url).await {
            tracing::error!("Failed to remove orphaned image {}: {}", url, e);
        }
    }
}
