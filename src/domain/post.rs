use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalizer::ParsedItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: Option<String>,
    pub url: String,
    pub description: Option<String>,
    /// The feed's `<pubDate>` exactly as served. Not parsed.
    pub published_at: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(feed_id: Uuid, url: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            feed_id,
            title: None,
            url,
            description: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a post from a parsed feed item.
    ///
    /// Returns `None` for items without a link, since posts are deduplicated
    /// by URL.
    pub fn from_item(feed_id: Uuid, item: &ParsedItem) -> Option<Self> {
        let url = item.link.as_deref().map(str::trim).filter(|l| !l.is_empty())?;

        let mut post = Self::new(feed_id, url.to_string());
        post.title = item.title.clone();
        post.description = item.description.clone();
        post.published_at = item.pub_date.clone();
        Some(post)
    }

    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => "(Untitled)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(link: Option<&str>) -> ParsedItem {
        ParsedItem {
            title: Some("Hello".into()),
            link: link.map(String::from),
            description: Some("World".into()),
            pub_date: Some("Mon, 01 Jan 2024 00:00:00 GMT".into()),
        }
    }

    #[test]
    fn test_from_item_copies_fields() {
        let feed_id = Uuid::new_v4();
        let post = Post::from_item(feed_id, &item(Some("https://example.com/a"))).unwrap();

        assert_eq!(post.feed_id, feed_id);
        assert_eq!(post.url, "https://example.com/a");
        assert_eq!(post.title.as_deref(), Some("Hello"));
        assert_eq!(post.description.as_deref(), Some("World"));
        assert_eq!(post.published_at.as_deref(), Some("Mon, 01 Jan 2024 00:00:00 GMT"));
    }

    #[test]
    fn test_from_item_requires_link() {
        assert!(Post::from_item(Uuid::new_v4(), &item(None)).is_none());
        assert!(Post::from_item(Uuid::new_v4(), &item(Some("   "))).is_none());
    }

    #[test]
    fn test_fresh_ids() {
        let feed_id = Uuid::new_v4();
        let a = Post::from_item(feed_id, &item(Some("https://example.com/a"))).unwrap();
        let b = Post::from_item(feed_id, &item(Some("https://example.com/a"))).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_display_title_untitled() {
        let mut post = Post::new(Uuid::new_v4(), "https://example.com/a".into());
        assert_eq!(post.display_title(), "(Untitled)");
        post.title = Some(String::new());
        assert_eq!(post.display_title(), "(Untitled)");
    }
}
