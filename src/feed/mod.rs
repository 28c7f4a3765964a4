//! Feed fetching and parsing for feedrelay.

pub mod fetcher;
pub mod types;

pub use fetcher::FeedFetcher;
pub use types::{url_hash, Feed, FeedItem, FetchedFeed, MAX_DESCRIPTION_LENGTH, MAX_ITEMS_PER_FEED};

use crate::Result;

/// Source of feed data. The orchestrator only depends on this seam,
/// keeping it testable with in-memory fakes.
#[allow(async_fn_in_trait)]
pub trait FeedSource {
    /// Fetch and parse the feed at `url`, returning its current
    /// article list (newest first).
    async fn fetch(&self, url: &str) -> Result<FetchedFeed>;
}
