//! Feed and article types for feedrelay.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::schedule::Frequency;

/// Maximum length for an article description.
pub const MAX_DESCRIPTION_LENGTH: usize = 10000;

/// Maximum number of articles considered per processing pass.
pub const MAX_ITEMS_PER_FEED: usize = 100;

/// Compute the canonical identity hash of a feed URL (SHA-256, hex).
///
/// Two feed records with the same URL hash represent the same logical
/// feed and must be merged, never duplicated.
pub fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A registered feed: an RSS source plus its per-frequency polling
/// configuration, backed by a mailing list on the external platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// List identifier assigned by the external platform.
    pub list_id: String,
    /// Display name of the feed (the platform list name).
    pub name: String,
    /// Canonical feed URL.
    pub url: String,
    /// Frequencies this feed is polled at. A feed can be polled at
    /// multiple independent cadences simultaneously.
    pub frequencies: BTreeSet<Frequency>,
    /// Base URL used when generating article links in emails.
    pub email_base_url: Option<String>,
    /// Optional topic-group metadata.
    pub topic_group: Option<String>,
}

impl Feed {
    /// Create a feed with a single frequency membership.
    pub fn new(list_id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            list_id: list_id.into(),
            name: name.into(),
            url: url.into(),
            frequencies: BTreeSet::new(),
            email_base_url: None,
            topic_group: None,
        }
    }

    /// Add a frequency membership.
    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequencies.insert(frequency);
        self
    }

    /// Set the email base URL.
    pub fn with_email_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.email_base_url = Some(base_url.into());
        self
    }

    /// Set the topic group.
    pub fn with_topic_group(mut self, group: impl Into<String>) -> Self {
        self.topic_group = Some(group.into());
        self
    }

    /// The feed's identity hash.
    pub fn url_hash(&self) -> String {
        url_hash(&self.url)
    }

    /// Merge another record for the same logical feed into this one,
    /// unioning the frequency sets. The caller is responsible for
    /// checking that the URL hashes match.
    pub fn merge(&mut self, other: &Feed) {
        for freq in &other.frequencies {
            self.frequencies.insert(*freq);
        }
        if self.email_base_url.is_none() {
            self.email_base_url = other.email_base_url.clone();
        }
        if self.topic_group.is_none() {
            self.topic_group = other.topic_group.clone();
        }
    }
}

/// An article produced by an upstream feed.
///
/// Articles are immutable once observed; the system only classifies
/// them as seen or unseen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Article title.
    pub title: String,
    /// Link to the original article.
    pub link: String,
    /// Article description/summary, HTML stripped.
    pub description: String,
    /// Published timestamp as reported by the feed. Opaque: never
    /// parsed for ordering.
    pub published: String,
    /// Unique-enough identifier; falls back to the link when the feed
    /// provides no GUID.
    pub guid: String,
    /// Comma-separated free-text tags used for subscriber-interest
    /// matching (e.g. "minister 1, portfolio 2, region 5").
    pub filter_id: String,
}

impl FeedItem {
    /// Create an item; an empty GUID falls back to the link.
    pub fn new(title: impl Into<String>, link: impl Into<String>, guid: impl Into<String>) -> Self {
        let link = link.into();
        let guid = guid.into();
        let guid = if guid.is_empty() { link.clone() } else { guid };
        Self {
            title: title.into(),
            link,
            description: String::new(),
            published: String::new(),
            guid,
            filter_id: String::new(),
        }
    }

    /// Set the description, truncating over-long content.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let desc = description.into();
        if desc.len() > MAX_DESCRIPTION_LENGTH {
            self.description = desc.chars().take(MAX_DESCRIPTION_LENGTH).collect();
        } else {
            self.description = desc;
        }
        self
    }

    /// Set the published timestamp string.
    pub fn with_published(mut self, published: impl Into<String>) -> Self {
        self.published = published.into();
        self
    }

    /// Set the filter-identifier string.
    pub fn with_filter_id(mut self, filter_id: impl Into<String>) -> Self {
        self.filter_id = filter_id.into();
        self
    }

    /// The article's identifier tokens, split from the comma-separated
    /// filter-identifier string. Empty strings yield no tokens.
    pub fn filter_tokens(&self) -> BTreeSet<&str> {
        self.filter_id
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect()
    }
}

/// The result of fetching a feed: its title and current article list,
/// newest first as produced by the upstream feed.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    /// Feed title as reported upstream.
    pub title: String,
    /// Articles in upstream order (newest first).
    pub items: Vec<FeedItem>,
    /// When this data was fetched.
    pub fetched_at: DateTime<Utc>,
}
