use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum GatorError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned {status}")]
    HttpStatus { url: String, status: StatusCode },

    #[error("Request to {url} timed out after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },

    #[error("Feed parsing error: {reason} ({size} bytes, starting {prefix:?})")]
    FeedParse {
        reason: String,
        size: usize,
        prefix: String,
    },

    #[error("No feeds registered")]
    NoFeeds,

    #[error("Post {url} already stored for feed {feed_id}")]
    DuplicatePost { feed_id: Uuid, url: String },

    #[error("Invalid polling interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid request timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed URL must use http or https: {0}")]
    UnsupportedScheme(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already registered: {0}")]
    UserExists(String),

    #[error("Feed not found: {0}")]
    FeedNotFound(String),

    #[error("Feed already registered: {0}")]
    FeedExists(String),

    #[error("Already following feed {0}")]
    AlreadyFollowing(Uuid),

    #[error("No user logged in, run `gator login <name>` first")]
    NotLoggedIn,
}

impl GatorError {
    /// Whether the polling loop must stop on this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GatorError::NoFeeds)
    }
}

pub type Result<T> = std::result::Result<T, GatorError>;
