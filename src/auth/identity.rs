// Registration and credential checks on top of the account store
use serde::Deserialize;

use crate::auth::password::{hash_password, verify_password};
use crate::db::models::Account;
use crate::social::domain::{validate_username, SocialError};
use crate::social::{AccountRepository, NewAccount, RepositoryError};

#[derive(Debug, Default, Deserialize)]
pub struct Registration {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, SocialError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(SocialError::MissingField(field))
}

pub async fn register(
    accounts: &dyn AccountRepository,
    registration: Registration,
    bcrypt_cost: u32,
) -> Result<Account, SocialError> {
    let username = required(registration.username, "username")?;
    let password = required(registration.password, "password")?;
    let email = required(registration.email, "email")?;
    let username = validate_username(Some(&username))?;

    if accounts.find_by_username(&username).await?.is_some() {
        tracing::warn!("Registration rejected: {} already exists", username);
        return Err(SocialError::UsernameTaken);
    }

    let password_hash = hash_password(&password, bcrypt_cost)
        .map_err(|e| SocialError::CreationFailed(e.to_string()))?;

    let account = accounts
        .create(&NewAccount {
            username,
            email: email.trim().to_string(),
            password_hash,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => SocialError::UsernameTaken,
            other => SocialError::CreationFailed(other.to_string()),
        })?;

    tracing::info!("Registered account {}", account.username);
    Ok(account)
}

pub async fn authenticate(
    accounts: &dyn AccountRepository,
    credentials: Credentials,
) -> Result<Account, SocialError> {
    let (Some(username), Some(password)) = (credentials.username, credentials.password) else {
        return Err(SocialError::InvalidCredentials);
    };

    // Stored usernames are trimmed at registration
    let username = username.trim();
    match accounts.find_by_username(username).await? {
        Some(account) if verify_password(&password, &account.password_hash) => Ok(account),
        _ => {
            tracing::warn!("Login failed for {}", username);
            Err(SocialError::InvalidCredentials)
        }
    }
}
