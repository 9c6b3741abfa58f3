use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub created_at: String,
}

impl Account {
    pub const COLUMNS: &'static str =
        "id, username, email, password_hash, bio, location, avatar_url, cover_url, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            bio: row.get(4)?,
            location: row.get(5)?,
            avatar_url: row.get(6)?,
            cover_url: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
