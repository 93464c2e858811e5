//! One poll cycle: claim the stalest feed, fetch it, store its new posts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::app::{GatorError, Result};
use crate::domain::{Feed, Post};
use crate::fetcher::Fetcher;
use crate::normalizer::{Normalizer, ParsedFeed};
use crate::store::Store;

/// Outcome of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed_id: Uuid,
    pub feed_url: String,
    /// Posts newly stored by this cycle.
    pub inserted: usize,
    /// Items already stored for this feed.
    pub duplicates: usize,
    /// Items without a link.
    pub skipped: usize,
}

pub struct Ingestor {
    store: Arc<dyn Store + Send + Sync>,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    normalizer: Normalizer,
    request_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store + Send + Sync>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        normalizer: Normalizer,
        request_timeout: Duration,
    ) -> Result<Self> {
        if request_timeout.is_zero() || Instant::now().checked_add(request_timeout).is_none() {
            return Err(GatorError::InvalidTimeout(format!("{:?}", request_timeout)));
        }

        Ok(Self {
            store,
            fetcher,
            normalizer,
            request_timeout,
        })
    }

    /// Run one cycle against the feed fetched longest ago.
    ///
    /// The feed is marked fetched before the request goes out, so a failed
    /// fetch or parse still moves it to the back of the queue. Posts stored
    /// before a storage error stay stored.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let feed = self.store.next_feed_to_fetch()?.ok_or(GatorError::NoFeeds)?;
        let deadline = Instant::now()
            .checked_add(self.request_timeout)
            .ok_or_else(|| GatorError::InvalidTimeout(format!("{:?}", self.request_timeout)))?;

        self.store.mark_fetched(feed.id, Utc::now())?;
        tracing::debug!(feed = %feed.url, "Claimed feed");

        let body = self.fetcher.fetch(&feed.url, deadline).await?;
        let parsed = self.normalizer.parse(&body)?;

        self.store_items(&feed, &parsed)
    }

    /// Insert the parsed items of `feed` in document order.
    pub fn store_items(&self, feed: &Feed, parsed: &ParsedFeed) -> Result<CycleReport> {
        let mut report = CycleReport {
            feed_id: feed.id,
            feed_url: feed.url.clone(),
            inserted: 0,
            duplicates: 0,
            skipped: 0,
        };

        for item in &parsed.items {
            let Some(post) = Post::from_item(feed.id, item) else {
                tracing::debug!(feed = %feed.url, title = ?item.title, "Skipping item without link");
                report.skipped += 1;
                continue;
            };

            match self.store.insert_post(&post) {
                Ok(()) => report.inserted += 1,
                Err(GatorError::DuplicatePost { .. }) => report.duplicates += 1,
                Err(e) => {
                    tracing::error!(feed = %feed.url, post = %post.url, error = %e, "Failed to store post");
                    return Err(e);
                }
            }
        }

        tracing::info!(
            feed = %feed.url,
            inserted = report.inserted,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "Added {} new posts from {}",
            report.inserted,
            feed.display_title()
        );

        Ok(report)
    }
}
