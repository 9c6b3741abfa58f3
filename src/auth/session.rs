use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::social::RepoResult;
use crate::state::DbPool;

/// Account bound to a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAccount {
    pub account_id: String,
    pub username: String,
}

/// Create a new session for an account. Returns the session token.
pub fn create_session(pool: &DbPool, account_id: &str, hours: u64) -> RepoResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, account_id, token, expires_at)
         VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, account_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Resolve an unexpired session token to its account.
pub fn find_session(pool: &DbPool, token: &str) -> RepoResult<Option<SessionAccount>> {
    let conn = pool.get()?;
    Ok(conn
        .query_row(
            "SELECT a.id, a.username FROM sessions s \
             JOIN accounts a ON a.id = s.account_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(SessionAccount {
                    account_id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()?)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> RepoResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
