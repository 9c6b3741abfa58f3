// Content store, action ledger and feed queries
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::{is_unique_violation, now_timestamp};
use crate::social::domain::{ActionKind, CommentView, PostView, ToggleOutcome};
use crate::social::repository::{RepoResult, RepositoryError};
use crate::state::DbPool;

const POST_SELECT: &str = "SELECT p.id, p.body, a.username, p.author_id, p.likes_count, \
     p.reposts_count, p.comments_count, p.shares_count, p.image_url, p.created_at \
     FROM posts p JOIN accounts a ON a.id = p.author_id";

// rowid breaks ties between posts created in the same millisecond
const NEWEST_FIRST: &str = "ORDER BY p.created_at DESC, p.rowid DESC";

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(
        &self,
        author_id: &str,
        text: &str,
        image_url: Option<&str>,
    ) -> RepoResult<PostView>;

    async fn get(&self, id: &str) -> RepoResult<Option<PostView>>;

    async fn list_all(&self) -> RepoResult<Vec<PostView>>;

    async fn list_by_author(&self, author_id: &str) -> RepoResult<Vec<PostView>>;

    /// Posts by every account the viewer follows.
    async fn list_following(&self, viewer_id: &str) -> RepoResult<Vec<PostView>>;

    async fn count_by_author(&self, author_id: &str) -> RepoResult<i64>;

    /// Insert the (actor, post, kind) ledger row if absent, delete it if present,
    /// and resync the matching counter. Runs in one IMMEDIATE transaction.
    async fn toggle_action(
        &self,
        actor_id: &str,
        post_id: &str,
        kind: ActionKind,
    ) -> RepoResult<ToggleOutcome>;

    /// Kinds the actor currently has on the post.
    async fn actions_for(&self, actor_id: &str, post_id: &str) -> RepoResult<Vec<ActionKind>>;

    /// Returns the new comment and the post's updated `comments_count`.
    async fn add_comment(
        &self,
        actor_id: &str,
        post_id: &str,
        text: &str,
    ) -> RepoResult<(CommentView, i64)>;

    async fn list_comments(&self, post_id: &str) -> RepoResult<Vec<CommentView>>;
}

pub struct SqlitePostRepository {
    pool: DbPool,
}

impl SqlitePostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn query_posts(
        conn: &Connection,
        filter: &str,
        args: impl rusqlite::Params,
    ) -> RepoResult<Vec<PostView>> {
        let sql = format!("{} {} {}", POST_SELECT, filter, NEWEST_FIRST);
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(args, post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(posts)
    }

    fn load_post(conn: &Connection, id: &str) -> RepoResult<Option<PostView>> {
        let sql = format!("{} WHERE p.id = ?1", POST_SELECT);
        Ok(conn.query_row(&sql, params![id], post_from_row).optional()?)
    }

    fn ensure_post(conn: &Connection, id: &str) -> RepoResult<()> {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(RepositoryError::NotFound(format!("post {}", id)))
        }
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostView> {
    Ok(PostView {
        id: row.get(0)?,
        text: row.get(1)?,
        author: row.get(2)?,
        author_id: row.get(3)?,
        likes_count: row.get(4)?,
        reposts_count: row.get(5)?,
        comments_count: row.get(6)?,
        shares_count: row.get(7)?,
        image: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        created_at: row.get(9)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentView> {
    Ok(CommentView {
        id: row.get(0)?,
        post_id: row.get(1)?,
        text: row.get(2)?,
        author: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn create(
        &self,
        author_id: &str,
        text: &str,
        image_url: Option<&str>,
    ) -> RepoResult<PostView> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();

        conn.execute(
            "INSERT INTO posts (id, author_id, body, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, author_id, text, image_url, now_timestamp()],
        )?;

        Self::load_post(&conn, &id)?.ok_or_else(|| RepositoryError::NotFound(id))
    }

    async fn get(&self, id: &str) -> RepoResult<Option<PostView>> {
        let conn = self.pool.get()?;
        Self::load_post(&conn, id)
    }

    async fn list_all(&self) -> RepoResult<Vec<PostView>> {
        let conn = self.pool.get()?;
        Self::query_posts(&conn, "", [])
    }

    async fn list_by_author(&self, author_id: &str) -> RepoResult<Vec<PostView>> {
        let conn = self.pool.get()?;
        Self::query_posts(&conn, "WHERE p.author_id = ?1", params![author_id])
    }

    async fn list_following(&self, viewer_id: &str) -> RepoResult<Vec<PostView>> {
        let conn = self.pool.get()?;
        Self::query_posts(
            &conn,
            "WHERE p.author_id IN (SELECT followee_id FROM follows WHERE follower_id = ?1)",
            params![viewer_id],
        )
    }

    async fn count_by_author(&self, author_id: &str) -> RepoResult<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
            params![author_id],
            |row| row.get(0),
        )?)
    }

    async fn toggle_action(
        &self,
        actor_id: &str,
        post_id: &str,
        kind: ActionKind,
    ) -> RepoResult<ToggleOutcome> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_post(&tx, post_id)?;

        let removed = tx.execute(
            "DELETE FROM post_actions WHERE account_id = ?1 AND post_id = ?2 AND action_type = ?3",
            params![actor_id, post_id, kind.as_str()],
        )?;

        let active = if removed > 0 {
            false
        } else {
            match tx.execute(
                "INSERT INTO post_actions (id, account_id, post_id, action_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    uuid::Uuid::now_v7().to_string(),
                    actor_id,
                    post_id,
                    kind.as_str(),
                    now_timestamp()
                ],
            ) {
                Ok(_) => true,
                // A concurrent toggle already inserted the row
                Err(e) if is_unique_violation(&e) => true,
                Err(e) => return Err(e.into()),
            }
        };

        // The counter is the ledger row count, never an increment
        let column = kind.counter_column();
        tx.execute(
            &format!(
                "UPDATE posts SET {column} = (SELECT COUNT(*) FROM post_actions \
                 WHERE post_id = ?1 AND action_type = ?2) WHERE id = ?1"
            ),
            params![post_id, kind.as_str()],
        )?;
        let count: i64 = tx.query_row(
            &format!("SELECT {column} FROM posts WHERE id = ?1"),
            params![post_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        tracing::debug!(
            "Toggled {} on post {} by {}: active={}, count={}",
            kind,
            post_id,
            actor_id,
            active,
            count
        );

        Ok(ToggleOutcome {
            kind,
            active,
            count,
        })
    }

    async fn actions_for(&self, actor_id: &str, post_id: &str) -> RepoResult<Vec<ActionKind>> {
        let conn = self.pool.get()?;
        Self::ensure_post(&conn, post_id)?;

        let mut stmt = conn.prepare(
            "SELECT action_type FROM post_actions
             WHERE account_id = ?1 AND post_id = ?2
             ORDER BY created_at, rowid",
        )?;
        let kinds = stmt
            .query_map(params![actor_id, post_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        Ok(kinds)
    }

    async fn add_comment(
        &self,
        actor_id: &str,
        post_id: &str,
        text: &str,
    ) -> RepoResult<(CommentView, i64)> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::ensure_post(&tx, post_id)?;

        let id = uuid::Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO comments (id, post_id, author_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, post_id, actor_id, text, now_timestamp()],
        )?;
        tx.execute(
            "UPDATE posts SET comments_count =
               (SELECT COUNT(*) FROM comments WHERE post_id = ?1)
             WHERE id = ?1",
            params![post_id],
        )?;

        let comment = tx.query_row(
            "SELECT c.id, c.post_id, c.body, a.username, c.created_at
             FROM comments c JOIN accounts a ON a.id = c.author_id
             WHERE c.id = ?1",
            params![id],
            comment_from_row,
        )?;
        let count: i64 = tx.query_row(
            "SELECT comments_count FROM posts WHERE id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok((comment, count))
    }

    async fn list_comments(&self, post_id: &str) -> RepoResult<Vec<CommentView>> {
        let conn = self.pool.get()?;
        Self::ensure_post(&conn, post_id)?;

        let mut stmt = conn.prepare(
            "SELECT c.id, c.post_id, c.body, a.username, c.created_at
             FROM comments c JOIN accounts a ON a.id = c.author_id
             WHERE c.post_id = ?1
             ORDER BY c.created_at, c.rowid",
        )?;
        let comments = stmt
            .query_map(params![post_id], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_account, migrated_pool};

    fn ledger_count(pool: &DbPool, post_id: &str, kind: ActionKind) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM post_actions WHERE post_id = ?1 AND action_type = ?2",
            params![post_id, kind.as_str()],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn follow(pool: &DbPool, follower: &str, followee: &str) {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO follows (follower_id, followee_id) VALUES (?1, ?2)",
            params![follower, followee],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn new_post_starts_at_zero() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        let repo = SqlitePostRepository::new(pool);

        let post = repo.create("a", "hello", None).await.unwrap();
        assert_eq!(post.text, "hello");
        assert_eq!(post.author, "alice");
        assert_eq!(post.image, "");
        assert_eq!(
            (post.likes_count, post.reposts_count, post.comments_count, post.shares_count),
            (0, 0, 0, 0)
        );
        assert!(chrono::DateTime::parse_from_rfc3339(&post.created_at).is_ok());
    }

    #[tokio::test]
    async fn like_twice_restores_state() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        insert_account(&pool, "b", "bob");
        let repo = SqlitePostRepository::new(pool.clone());
        let post = repo.create("a", "hello", None).await.unwrap();

        let on = repo.toggle_action("b", &post.id, ActionKind::Like).await.unwrap();
        assert!(on.active);
        assert_eq!(on.count, 1);
        assert_eq!(ledger_count(&pool, &post.id, ActionKind::Like), 1);

        let off = repo.toggle_action("b", &post.id, ActionKind::Like).await.unwrap();
        assert!(!off.active);
        assert_eq!(off.count, 0);
        assert_eq!(ledger_count(&pool, &post.id, ActionKind::Like), 0);
        assert_eq!(repo.get(&post.id).await.unwrap().unwrap().likes_count, 0);
    }

    #[tokio::test]
    async fn kinds_are_independent() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        let repo = SqlitePostRepository::new(pool);
        let post = repo.create("a", "hello", None).await.unwrap();

        repo.toggle_action("a", &post.id, ActionKind::Repost).await.unwrap();
        repo.toggle_action("a", &post.id, ActionKind::Share).await.unwrap();

        let stored = repo.get(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.count_for(ActionKind::Like), 0);
        assert_eq!(stored.count_for(ActionKind::Repost), 1);
        assert_eq!(stored.count_for(ActionKind::Share), 1);

        let mut kinds = repo.actions_for("a", &post.id).await.unwrap();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![ActionKind::Repost, ActionKind::Share]);
    }

    #[tokio::test]
    async fn counter_resyncs_from_ledger() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        insert_account(&pool, "b", "bob");
        let repo = SqlitePostRepository::new(pool.clone());
        let post = repo.create("a", "hello", None).await.unwrap();

        // Drift the denormalized counter by hand
        pool.get()
            .unwrap()
            .execute(
                "UPDATE posts SET likes_count = 42 WHERE id = ?1",
                params![post.id],
            )
            .unwrap();

        let outcome = repo.toggle_action("b", &post.id, ActionKind::Like).await.unwrap();
        assert_eq!(outcome.count, 1);
    }

    #[tokio::test]
    async fn toggle_on_missing_post_is_not_found() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        let repo = SqlitePostRepository::new(pool);

        let err = repo
            .toggle_action("a", "nope", ActionKind::Like)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
        assert!(matches!(
            repo.actions_for("a", "nope").await.unwrap_err(),
            RepositoryError::NotFound(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_likes_keep_counter_exact() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "author", "author");
        let likers: Vec<String> = (0..12).map(|i| format!("u{}", i)).collect();
        for id in &likers {
            insert_account(&pool, id, &format!("user{}", id));
        }
        let repo = std::sync::Arc::new(SqlitePostRepository::new(pool.clone()));
        let post = repo.create("author", "hot take", None).await.unwrap();

        let mut handles = Vec::new();
        for liker in likers.clone() {
            let repo = repo.clone();
            let post_id = post.id.clone();
            handles.push(tokio::spawn(async move {
                repo.toggle_action(&liker, &post_id, ActionKind::Like)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().active);
        }

        let stored = repo.get(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.likes_count, likers.len() as i64);
        assert_eq!(
            stored.likes_count,
            ledger_count(&pool, &post.id, ActionKind::Like)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_by_one_actor_settle_on_parity() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "author", "author");
        insert_account(&pool, "bob", "bob");
        let repo = std::sync::Arc::new(SqlitePostRepository::new(pool.clone()));
        let post = repo.create("author", "toggle me", None).await.unwrap();

        const TOGGLES: usize = 9;
        let mut handles = Vec::new();
        for _ in 0..TOGGLES {
            let repo = repo.clone();
            let post_id = post.id.clone();
            handles.push(tokio::spawn(async move {
                repo.toggle_action("bob", &post_id, ActionKind::Like).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let live = ledger_count(&pool, &post.id, ActionKind::Like);
        assert_eq!(live, (TOGGLES % 2) as i64);
        let stored = repo.get(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.likes_count, live);
    }

    #[tokio::test]
    async fn listings_are_newest_first() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        insert_account(&pool, "b", "bob");
        let repo = SqlitePostRepository::new(pool);

        let first = repo.create("a", "one", None).await.unwrap();
        let second = repo.create("b", "two", Some("/media/x.png")).await.unwrap();
        let third = repo.create("a", "three", None).await.unwrap();

        let all: Vec<String> = repo.list_all().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(all, vec![third.id.clone(), second.id.clone(), first.id.clone()]);

        let by_alice: Vec<String> = repo
            .list_by_author("a")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(by_alice, vec![third.id, first.id]);
        assert_eq!(repo.count_by_author("a").await.unwrap(), 2);
        assert_eq!(repo.get(&second.id).await.unwrap().unwrap().image, "/media/x.png");
    }

    #[tokio::test]
    async fn following_feed_contains_only_followed_authors() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        insert_account(&pool, "b", "bob");
        insert_account(&pool, "c", "carol");
        let repo = SqlitePostRepository::new(pool.clone());

        assert!(repo.list_following("a").await.unwrap().is_empty());

        repo.create("b", "from bob 1", None).await.unwrap();
        repo.create("c", "from carol", None).await.unwrap();
        repo.create("b", "from bob 2", None).await.unwrap();
        repo.create("a", "from alice", None).await.unwrap();
        assert!(repo.list_following("a").await.unwrap().is_empty());

        follow(&pool, "a", "b");
        let feed = repo.list_following("a").await.unwrap();
        let texts: Vec<&str> = feed.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["from bob 2", "from bob 1"]);
        assert!(feed.iter().all(|p| p.author == "bob"));
    }

    #[tokio::test]
    async fn comments_drive_comment_counter() {
        let (_tmp, pool) = migrated_pool();
        insert_account(&pool, "a", "alice");
        insert_account(&pool, "b", "bob");
        let repo = SqlitePostRepository::new(pool);
        let post = repo.create("a", "hello", None).await.unwrap();

        let (first, count) = repo.add_comment("b", &post.id, "nice").await.unwrap();
        assert_eq!(first.author, "bob");
        assert_eq!(count, 1);
        let (_, count) = repo.add_comment("a", &post.id, "thanks").await.unwrap();
        assert_eq!(count, 2);

        let comments = repo.list_comments(&post.id).await.unwrap();
        let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["nice", "thanks"]);
        assert_eq!(repo.get(&post.id).await.unwrap().unwrap().comments_count, 2);

        assert!(matches!(
            repo.add_comment("a", "missing", "x").await.unwrap_err(),
            RepositoryError::NotFound(_)
        ));
    }
}
