pub mod accounts;
pub mod domain;
pub mod posts;
pub mod profile;
pub mod repository;

pub use accounts::{AccountRepository, AccountUpdate, NewAccount, SqliteAccountRepository};
pub use domain::*;
pub use posts::{PostRepository, SqlitePostRepository};
pub use repository::{RepoResult, RepositoryError};
