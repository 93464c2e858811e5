pub mod sqlite;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::app::Result;
use crate::domain::{Feed, FeedFollow, Post, User};

pub use sqlite::SqliteStore;

pub trait Store {
    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    fn get_user_by_name(&self, name: &str) -> Result<Option<User>>;
    fn get_all_users(&self) -> Result<Vec<User>>;
    /// Delete every user; feeds, follows and posts go with them.
    fn reset(&self) -> Result<usize>;

    // Feed operations
    fn add_feed(&self, feed: &Feed) -> Result<()>;
    fn get_feed(&self, id: Uuid) -> Result<Option<Feed>>;
    fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>>;
    fn get_all_feeds(&self) -> Result<Vec<Feed>>;
    /// The feed fetched longest ago, never-fetched feeds first.
    fn next_feed_to_fetch(&self) -> Result<Option<Feed>>;
    /// Set `last_fetched_at`, never moving it backwards.
    fn mark_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    // Follow operations
    fn follow(&self, follow: &FeedFollow) -> Result<()>;
    fn unfollow(&self, user_id: Uuid, feed_id: Uuid) -> Result<bool>;
    fn get_followed_feeds(&self, user_id: Uuid) -> Result<Vec<Feed>>;

    // Post operations
    /// Fails with [`GatorError::DuplicatePost`](crate::app::GatorError::DuplicatePost)
    /// when the feed already has a post with this URL.
    fn insert_post(&self, post: &Post) -> Result<()>;
    fn get_posts_by_feed(&self, feed_id: Uuid) -> Result<Vec<Post>>;
    fn get_posts_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<Post>>;
}
