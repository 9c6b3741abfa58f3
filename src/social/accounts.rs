// Account store: identity, profile columns and the follow graph
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::db::models::Account;
use crate::db::{is_unique_violation, now_timestamp};
use crate::social::domain::{FollowOutcome, UserSummary};
use crate::social::repository::{RepoResult, RepositoryError};
use crate::state::DbPool;

pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// New values for every mutable profile column.
/// `password_hash: None` keeps the stored credential.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub username: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub password_hash: Option<String>,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account; a taken username is a `Conflict`.
    async fn create(&self, account: &NewAccount) -> RepoResult<Account>;

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Account>>;

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Account>>;

    /// Whether `username` belongs to an account other than `except_id`.
    async fn username_taken(&self, username: &str, except_id: Option<&str>) -> RepoResult<bool>;

    /// Persist a profile update in one statement.
    async fn update(&self, id: &str, update: &AccountUpdate) -> RepoResult<Account>;

    /// Add the actor -> target edge if missing, remove it otherwise.
    /// Following yourself is a no-op.
    async fn toggle_follow(&self, actor_id: &str, target_id: &str) -> RepoResult<FollowOutcome>;

    /// Ids the account follows, oldest edge first.
    async fn following_ids(&self, id: &str) -> RepoResult<Vec<String>>;

    async fn follower_count(&self, id: &str) -> RepoResult<i64>;

    /// Other accounts for a signed-in viewer, or the first `limit` accounts.
    async fn suggestions(
        &self,
        viewer_id: Option<&str>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<UserSummary>>;
}

pub struct SqliteAccountRepository {
    pool: DbPool,
}

impl SqliteAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn load(conn: &rusqlite::Connection, id: &str) -> RepoResult<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?1", Account::COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], Account::from_row)
            .optional()?)
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn create(&self, account: &NewAccount) -> RepoResult<Account> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();

        let inserted = conn.execute(
            "INSERT INTO accounts (id, username, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                account.username,
                account.email,
                account.password_hash,
                now_timestamp()
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(RepositoryError::Conflict("username taken".into()))
            }
            Err(e) => return Err(e.into()),
        }

        Self::load(&conn, &id)?.ok_or_else(|| RepositoryError::NotFound(id))
    }

    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Account>> {
        let conn = self.pool.get()?;
        Self::load(&conn, id)
    }

    async fn find_by_username(&self, username: &str) -> RepoResult<Option<Account>> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM accounts WHERE username = ?1",
            Account::COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![username], Account::from_row)
            .optional()?)
    }

    async fn username_taken(&self, username: &str, except_id: Option<&str>) -> RepoResult<bool> {
        let conn = self.pool.get()?;
        let taken: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM accounts WHERE username = ?1 AND id IS NOT ?2",
            params![username, except_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    async fn update(&self, id: &str, update: &AccountUpdate) -> RepoResult<Account> {
        let conn = self.pool.get()?;

        let result = conn.execute(
            "UPDATE accounts SET
               username = ?2,
               bio = ?3,
               location = ?4,
               avatar_url = ?5,
               cover_url = ?6,
               password_hash = COALESCE(?7, password_hash)
             WHERE id = ?1",
            params![
                id,
                update.username,
                update.bio,
                update.location,
                update.avatar_url,
                update.cover_url,
                update.password_hash
            ],
        );
        let rows = match result {
            Ok(rows) => rows,
            Err(e) if is_unique_violation(&e) => {
                return Err(RepositoryError::Conflict("username taken".into()))
            }
            Err(e) => return Err(e.into()),
        };
        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("account {}", id)));
        }

        Self::load(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn toggle_follow(&self, actor_id: &str, target_id: &str) -> RepoResult<FollowOutcome> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let target_exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM accounts WHERE id = ?1",
            params![target_id],
            |row| row.get(0),
        )?;
        if !target_exists {
            return Err(RepositoryError::NotFound(format!("account {}", target_id)));
        }

        let following = if actor_id == target_id {
            false
        } else {
            let removed = tx.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                params![actor_id, target_id],
            )?;
            if removed > 0 {
                false
            } else {
                match tx.execute(
                    "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)",
                    params![actor_id, target_id, now_timestamp()],
                ) {
                    Ok(_) => true,
                    // Lost a race with an identical insert: the edge exists
                    Err(e) if is_unique_violation(&e) => true,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let following_count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![actor_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(FollowOutcome {
            following,
            following_count,
        })
    }

    async fn following_ids(&self, id: &str) -> RepoResult<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT followee_id FROM follows WHERE follower_id = ?1 ORDER BY created_at, rowid",
        )?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn follower_count(&self, id: &str) -> RepoResult<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE followee_id = ?1",
            params![id],
            |row| row.get(0),
        )?)
    }

    async fn suggestions(
        &self,
        viewer_id: Option<&str>,
        limit: Option<u32>,
    ) -> RepoResult<Vec<UserSummary>> {
        let conn = self.pool.get()?;
        // LIMIT -1 means unbounded in SQLite
        let limit = limit.map(i64::from).unwrap_or(-1);
        let mut stmt = conn.prepare(
            "SELECT id, username FROM accounts
             WHERE id IS NOT ?1
             ORDER BY created_at, rowid
             LIMIT ?2",
        )?;
        let users = stmt
            .query_map(params![viewer_id, limit], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}
