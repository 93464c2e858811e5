use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use uuid::Uuid;

use crate::app::{GatorError, Result};
use crate::domain::{Feed, FeedFollow, Post, User};
use crate::store::Store;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations.to_latest(&mut conn)?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            GatorError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    /// Fixed-width UTC text, so SQL string ordering matches time ordering.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn required_datetime(row: &Row<'_>, idx: usize) -> DateTime<Utc> {
        row.get::<_, String>(idx)
            .ok()
            .and_then(|s| Self::parse_datetime(&s))
            .unwrap_or_else(Utc::now)
    }

    fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: Self::required_datetime(row, 2),
            updated_at: Self::required_datetime(row, 3),
        })
    }

    fn feed_from_row(row: &Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            user_id: row.get(3)?,
            created_at: Self::required_datetime(row, 4),
            updated_at: Self::required_datetime(row, 5),
            last_fetched_at: row
                .get::<_, Option<String>>(6)?
                .and_then(|s| Self::parse_datetime(&s)),
        })
    }

    fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
        Ok(Post {
            id: row.get(0)?,
            feed_id: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            description: row.get(4)?,
            published_at: row.get(5)?,
            created_at: Self::required_datetime(row, 6),
            updated_at: Self::required_datetime(row, 7),
        })
    }
}

/// Uniqueness violations are told apart by SQLite's extended result code.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

const USER_COLUMNS: &str = "id, name, created_at, updated_at";

const FEED_COLUMNS: &str = "id, name, url, user_id, created_at, updated_at, last_fetched_at";

const POST_COLUMNS: &str =
    "id, feed_id, title, url, description, published_at, created_at, updated_at";

impl Store for SqliteStore {
    fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO users (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user.id,
                user.name,
                Self::format_datetime(&user.created_at),
                Self::format_datetime(&user.updated_at)
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatorError::UserExists(user.name.clone())
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                Self::user_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?1"),
                params![name],
                Self::user_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY name"))?;
        let users = stmt
            .query_map([], Self::user_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    fn reset(&self) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM users", [])?;
        Ok(deleted)
    }

    fn add_feed(&self, feed: &Feed) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO feeds (id, name, url, user_id, created_at, updated_at, last_fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                feed.id,
                feed.name,
                feed.url,
                feed.user_id,
                Self::format_datetime(&feed.created_at),
                Self::format_datetime(&feed.updated_at),
                feed.last_fetched_at.as_ref().map(Self::format_datetime)
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatorError::FeedExists(feed.url.clone())
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    fn get_feed(&self, id: Uuid) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"),
                params![id],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?1"),
                params![url],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let mut stmt =
            conn.prepare(&format!("SELECT {FEED_COLUMNS} FROM feeds ORDER BY name, url"))?;
        let feeds = stmt
            .query_map([], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn next_feed_to_fetch(&self) -> Result<Option<Feed>> {
        let conn = self.conn()?;

        // `last_fetched_at IS NOT NULL` sorts never-fetched feeds first.
        let result = conn
            .query_row(
                &format!(
                    "SELECT {FEED_COLUMNS} FROM feeds
                     ORDER BY last_fetched_at IS NOT NULL, last_fetched_at, created_at, id
                     LIMIT 1"
                ),
                [],
                Self::feed_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn mark_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        let at = Self::format_datetime(&at);

        let updated = conn.execute(
            "UPDATE feeds SET last_fetched_at = ?1, updated_at = ?1
             WHERE id = ?2 AND (last_fetched_at IS NULL OR last_fetched_at <= ?1)",
            params![at, feed_id],
        )?;

        if updated == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM feeds WHERE id = ?1)",
                params![feed_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(GatorError::FeedNotFound(feed_id.to_string()));
            }
        }

        Ok(())
    }

    fn follow(&self, follow: &FeedFollow) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                follow.id,
                follow.user_id,
                follow.feed_id,
                Self::format_datetime(&follow.created_at),
                Self::format_datetime(&follow.updated_at)
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatorError::AlreadyFollowing(follow.feed_id)
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    fn unfollow(&self, user_id: Uuid, feed_id: Uuid) -> Result<bool> {
        let conn = self.conn()?;

        let deleted = conn.execute(
            "DELETE FROM feed_follows WHERE user_id = ?1 AND feed_id = ?2",
            params![user_id, feed_id],
        )?;

        Ok(deleted > 0)
    }

    fn get_followed_feeds(&self, user_id: Uuid) -> Result<Vec<Feed>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at, f.last_fetched_at
             FROM feeds f
             JOIN feed_follows ff ON ff.feed_id = f.id
             WHERE ff.user_id = ?1
             ORDER BY f.name, f.url",
        )?;
        let feeds = stmt
            .query_map(params![user_id], Self::feed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(feeds)
    }

    fn insert_post(&self, post: &Post) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO posts (id, feed_id, title, url, description, published_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                post.id,
                post.feed_id,
                post.title,
                post.url,
                post.description,
                post.published_at,
                Self::format_datetime(&post.created_at),
                Self::format_datetime(&post.updated_at)
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                GatorError::DuplicatePost {
                    feed_id: post.feed_id,
                    url: post.url.clone(),
                }
            } else {
                e.into()
            }
        })?;

        Ok(())
    }

    fn get_posts_by_feed(&self, feed_id: Uuid) -> Result<Vec<Post>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE feed_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let posts = stmt
            .query_map(params![feed_id], Self::post_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    fn get_posts_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Post>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at,
                    p.created_at, p.updated_at
             FROM posts p
             JOIN feed_follows ff ON ff.feed_id = p.feed_id
             WHERE ff.user_id = ?1
             ORDER BY p.created_at DESC, p.rowid DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let posts = stmt
            .query_map(params![user_id, limit], Self::post_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn store_with_user() -> (SqliteStore, User) {
        let store = SqliteStore::in_memory().unwrap();
        let user = User::new("kahya".into());
        store.create_user(&user).unwrap();
        (store, user)
    }

    fn add_feed(store: &SqliteStore, user: &User, url: &str) -> Feed {
        let feed = Feed::new(format!("Feed {url}"), url.into(), user.id);
        store.add_feed(&feed).unwrap();
        feed
    }

    #[test]
    fn test_add_and_get_feed() {
        let (store, user) = store_with_user();
        let feed = add_feed(&store, &user, "https://example.com/feed.xml");

        let retrieved = store.get_feed(feed.id).unwrap().unwrap();
        assert_eq!(retrieved.url, "https://example.com/feed.xml");
        assert_eq!(retrieved.user_id, user.id);
        assert!(retrieved.last_fetched_at.is_none());
    }

    #[test]
    fn test_get_feed_by_url() {
        let (store, user) = store_with_user();
        let feed = add_feed(&store, &user, "https://example.com/feed.xml");

        let found = store.get_feed_by_url("https://example.com/feed.xml").unwrap().unwrap();
        assert_eq!(found.id, feed.id);
        assert!(store.get_feed_by_url("https://other.com/feed.xml").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_feed_url_rejected() {
        let (store, user) = store_with_user();
        add_feed(&store, &user, "https://example.com/feed.xml");

        let again = Feed::new("Again".into(), "https://example.com/feed.xml".into(), user.id);
        let err = store.add_feed(&again).unwrap_err();
        assert!(matches!(err, GatorError::FeedExists(ref url) if url == "https://example.com/feed.xml"));
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let (store, _) = store_with_user();
        let err = store.create_user(&User::new("kahya".into())).unwrap_err();
        assert!(matches!(err, GatorError::UserExists(_)));
        assert_eq!(store.get_all_users().unwrap().len(), 1);
    }

    #[test]
    fn test_get_user_by_name_and_id() {
        let (store, user) = store_with_user();
        assert_eq!(store.get_user_by_name("kahya").unwrap().unwrap().id, user.id);
        assert!(store.get_user_by_name("holgith").unwrap().is_none());
        assert_eq!(store.get_user(user.id).unwrap().unwrap().name, "kahya");
    }

    #[test]
    fn test_timestamps_round_trip() {
        let (store, user) = store_with_user();
        let stored = store.get_user(user.id).unwrap().unwrap();
        assert_eq!(stored, user);
    }

    #[test]
    fn test_next_feed_none_when_empty() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.next_feed_to_fetch().unwrap().is_none());
    }

    #[test]
    fn test_never_fetched_feed_selected_first() {
        let (store, user) = store_with_user();
        let first = add_feed(&store, &user, "https://a.example.com/feed.xml");
        store.mark_fetched(first.id, Utc::now()).unwrap();
        let second = add_feed(&store, &user, "https://b.example.com/feed.xml");

        let next = store.next_feed_to_fetch().unwrap().unwrap();
        assert_eq!(next.id, second.id);
    }

    #[test]
    fn test_next_feed_oldest_fetch_first() {
        let (store, user) = store_with_user();
        let a = add_feed(&store, &user, "https://a.example.com/feed.xml");
        let b = add_feed(&store, &user, "https://b.example.com/feed.xml");
        let now = Utc::now();

        store.mark_fetched(a.id, now).unwrap();
        store.mark_fetched(b.id, now - Duration::minutes(5)).unwrap();

        assert_eq!(store.next_feed_to_fetch().unwrap().unwrap().id, b.id);

        store.mark_fetched(b.id, now + Duration::seconds(1)).unwrap();
        assert_eq!(store.next_feed_to_fetch().unwrap().unwrap().id, a.id);
    }

    #[test]
    fn test_mark_fetched_never_moves_backwards() {
        let (store, user) = store_with_user();
        let feed = add_feed(&store, &user, "https://example.com/feed.xml");
        let later = Utc::now();
        let earlier = later - Duration::hours(1);

        store.mark_fetched(feed.id, later).unwrap();
        store.mark_fetched(feed.id, earlier).unwrap();

        let stored = store.get_feed(feed.id).unwrap().unwrap();
        assert_eq!(stored.last_fetched_at, Some(later));
    }

    #[test]
    fn test_mark_fetched_unknown_feed() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.mark_fetched(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, GatorError::FeedNotFound(_)));
    }

    #[test]
    fn test_duplicate_post_reported_as_duplicate() {
        let (store, user) = store_with_user();
        let feed = add_feed(&store, &user, "https://example.com/feed.xml");

        let first = Post::new(feed.id, "https://example.com/a".into());
        store.insert_post(&first).unwrap();

        let second = Post::new(feed.id, "https://example.com/a".into());
        let err = store.insert_post(&second).unwrap_err();
        assert!(matches!(
            err,
            GatorError::DuplicatePost { feed_id, ref url } if feed_id == feed.id && url == "https://example.com/a"
        ));

        let posts = store.get_posts_by_feed(feed.id).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, first.id);
    }

    #[test]
    fn test_same_url_allowed_in_different_feeds() {
        let (store, user) = store_with_user();
        let a = add_feed(&store, &user, "https://a.example.com/feed.xml");
        let b = add_feed(&store, &user, "https://b.example.com/feed.xml");

        store.insert_post(&Post::new(a.id, "https://example.com/shared".into())).unwrap();
        store.insert_post(&Post::new(b.id, "https://example.com/shared".into())).unwrap();

        assert_eq!(store.get_posts_by_feed(a.id).unwrap().len(), 1);
        assert_eq!(store.get_posts_by_feed(b.id).unwrap().len(), 1);
    }

    #[test]
    fn test_post_for_unknown_feed_is_database_error() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .insert_post(&Post::new(Uuid::new_v4(), "https://example.com/a".into()))
            .unwrap_err();
        assert!(matches!(err, GatorError::Database(_)));
    }

    #[test]
    fn test_follow_and_unfollow() {
        let (store, user) = store_with_user();
        let feed = add_feed(&store, &user, "https://example.com/feed.xml");

        store.follow(&FeedFollow::new(user.id, feed.id)).unwrap();
        let err = store.follow(&FeedFollow::new(user.id, feed.id)).unwrap_err();
        assert!(matches!(err, GatorError::AlreadyFollowing(id) if id == feed.id));

        let followed = store.get_followed_feeds(user.id).unwrap();
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].id, feed.id);

        assert!(store.unfollow(user.id, feed.id).unwrap());
        assert!(!store.unfollow(user.id, feed.id).unwrap());
        assert!(store.get_followed_feeds(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_posts_for_user_only_followed_newest_first() {
        let (store, user) = store_with_user();
        let followed = add_feed(&store, &user, "https://a.example.com/feed.xml");
        let other = add_feed(&store, &user, "https://b.example.com/feed.xml");
        store.follow(&FeedFollow::new(user.id, followed.id)).unwrap();

        let base = Utc::now();
        for i in 0..3 {
            let mut post = Post::new(followed.id, format!("https://a.example.com/{i}"));
            post.created_at = base + Duration::seconds(i);
            store.insert_post(&post).unwrap();
        }
        store.insert_post(&Post::new(other.id, "https://b.example.com/x".into())).unwrap();

        let posts = store.get_posts_for_user(user.id, 2).unwrap();
        let urls: Vec<_> = posts.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example.com/2", "https://a.example.com/1"]);
    }

    #[test]
    fn test_reset_cascades() {
        let (store, user) = store_with_user();
        let feed = add_feed(&store, &user, "https://example.com/feed.xml");
        store.follow(&FeedFollow::new(user.id, feed.id)).unwrap();
        store.insert_post(&Post::new(feed.id, "https://example.com/a".into())).unwrap();

        assert_eq!(store.reset().unwrap(), 1);

        assert!(store.get_all_users().unwrap().is_empty());
        assert!(store.get_all_feeds().unwrap().is_empty());
        assert!(store.get_posts_by_feed(feed.id).unwrap().is_empty());
    }

    #[test]
    fn test_get_feed_nonexistent() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_feed(Uuid::new_v4()).unwrap().is_none());
    }
}
