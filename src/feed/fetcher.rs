//! HTTP feed fetcher with a bounded conditional-fetch cache.
//!
//! The cache keeps ETag/Last-Modified validators and the last parsed
//! article list per feed URL. A poll first tries a conditional GET; a
//! 304 or an unchanged body hash reuses the cached parse. When the
//! upstream is unreachable, cached data no older than the configured
//! staleness bound substitutes for the failed fetch.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchConfig;
use crate::feed::types::{FeedItem, FetchedFeed};
use crate::feed::FeedSource;
use crate::{RelayError, Result};

struct CacheEntry {
    etag: Option<String>,
    last_modified: Option<String>,
    content_hash: String,
    feed: FetchedFeed,
    fetched_at: DateTime<Utc>,
}

/// Bounded per-URL cache of validators and parsed feeds.
pub struct FetchCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
    max_stale: Duration,
}

impl FetchCache {
    pub fn new(capacity: usize, max_stale_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            max_stale: Duration::seconds(max_stale_secs as i64),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Conditional request validators for a URL, if cached.
    fn validators(&self, url: &str) -> (Option<String>, Option<String>) {
        let entries = self.lock();
        match entries.get(url) {
            Some(entry) => (entry.etag.clone(), entry.last_modified.clone()),
            None => (None, None),
        }
    }

    /// Cached feed for a 304 response. Refreshes the entry's age.
    fn not_modified(&self, url: &str, now: DateTime<Utc>) -> Option<FetchedFeed> {
        let mut entries = self.lock();
        let entry = entries.get_mut(url)?;
        entry.fetched_at = now;
        Some(entry.feed.clone())
    }

    /// Reuse the cached parse when the body hash is unchanged,
    /// refreshing validators and age.
    fn unchanged(
        &self,
        url: &str,
        content_hash: &str,
        etag: Option<String>,
        last_modified: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<FetchedFeed> {
        let mut entries = self.lock();
        let entry = entries.get_mut(url)?;
        if entry.content_hash != content_hash {
            return None;
        }
        entry.etag = etag;
        entry.last_modified = last_modified;
        entry.fetched_at = now;
        Some(entry.feed.clone())
    }

    /// Cached feed no older than the staleness bound, for use when a
    /// fetch fails outright.
    fn stale_fallback(&self, url: &str, now: DateTime<Utc>) -> Option<FetchedFeed> {
        let entries = self.lock();
        let entry = entries.get(url)?;
        (now.signed_duration_since(entry.fetched_at) <= self.max_stale)
            .then(|| entry.feed.clone())
    }

    /// Store a fresh parse, evicting the oldest tenth when full.
    fn store(&self, url: &str, entry: CacheEntry) {
        let mut entries = self.lock();
        if !entries.contains_key(url) && entries.len() >= self.capacity {
            let mut by_age: Vec<(DateTime<Utc>, String)> = entries
                .iter()
                .map(|(key, e)| (e.fetched_at, key.clone()))
                .collect();
            by_age.sort();
            let evict = (self.capacity / 10).max(1);
            for (_, key) in by_age.into_iter().take(evict) {
                entries.remove(&key);
            }
        }
        entries.insert(url.to_string(), entry);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    fn contains(&self, url: &str) -> bool {
        self.lock().contains_key(url)
    }
}

/// Reqwest-backed implementation of [`FeedSource`].
pub struct FeedFetcher {
    client: Client,
    cache: FetchCache,
    max_feed_size: u64,
}

impl FeedFetcher {
    /// Create a fetcher from fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(StdDuration::from_secs(config.connect_timeout_secs))
            .read_timeout(StdDuration::from_secs(config.read_timeout_secs))
            .timeout(StdDuration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RelayError::Fetch(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            cache: FetchCache::new(config.cache_capacity, config.max_stale_secs),
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    /// Serve cached data for a failed fetch, or surface the error.
    fn fall_back(&self, url: &str, now: DateTime<Utc>, error: RelayError) -> Result<FetchedFeed> {
        match self.cache.stale_fallback(url, now) {
            Some(feed) => {
                warn!(url, error = %error, "fetch failed, serving cached feed");
                Ok(feed)
            }
            None => Err(error),
        }
    }
}

impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed> {
        validate_url(url)?;
        let now = Utc::now();

        let (etag, last_modified) = self.cache.validators(url);
        let mut request = self.client.get(url);
        if let Some(etag) = &etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return self.fall_back(url, now, RelayError::Fetch(format!("{url}: {e}")));
            }
        };

        if response.status() == StatusCode::NOT_MODIFIED {
            if let Some(feed) = self.cache.not_modified(url, now) {
                debug!(url, "feed not modified");
                return Ok(feed);
            }
            // 304 without a cached copy: retry unconditionally next pass
            return Err(RelayError::Fetch(format!(
                "{url}: 304 with no cached copy"
            )));
        }
        if !response.status().is_success() {
            let error = RelayError::Fetch(format!("{url}: HTTP {}", response.status()));
            return self.fall_back(url, now, error);
        }
        if let Some(length) = response.content_length() {
            if length > self.max_feed_size {
                return Err(RelayError::Fetch(format!(
                    "{url}: feed size {length} exceeds limit"
                )));
            }
        }

        let fresh_etag = header_value(&response, ETAG);
        let fresh_last_modified = header_value(&response, LAST_MODIFIED);
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return self.fall_back(url, now, RelayError::Fetch(format!("{url}: {e}")));
            }
        };
        if body.len() as u64 > self.max_feed_size {
            return Err(RelayError::Fetch(format!(
                "{url}: feed size {} exceeds limit",
                body.len()
            )));
        }

        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(&body);
            format!("{:x}", hasher.finalize())
        };
        if let Some(feed) = self.cache.unchanged(
            url,
            &content_hash,
            fresh_etag.clone(),
            fresh_last_modified.clone(),
            now,
        ) {
            debug!(url, "feed body unchanged");
            return Ok(feed);
        }

        let feed = parse_feed(&body, now)?;
        self.cache.store(
            url,
            CacheEntry {
                etag: fresh_etag,
                last_modified: fresh_last_modified,
                content_hash,
                feed: feed.clone(),
                fetched_at: now,
            },
        );
        Ok(feed)
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Check the feed URL is an absolute http(s) URL before fetching.
fn validate_url(url: &str) -> Result<()> {
    let parsed =
        Url::parse(url).map_err(|e| RelayError::Validation(format!("invalid feed URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(RelayError::Validation(format!(
            "unsupported feed URL scheme: {scheme}"
        ))),
    }
}

/// Parse a feed body into the article list, newest first as produced
/// by the upstream feed.
fn parse_feed(body: &[u8], fetched_at: DateTime<Utc>) -> Result<FetchedFeed> {
    let parsed = feed_rs::parser::parse(body)
        .map_err(|e| RelayError::Parse(format!("unparseable feed: {e}")))?;

    let title = parsed.title.map(|t| t.content).unwrap_or_default();
    let items = parsed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "(untitled)".to_string());
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let description = entry
                .summary
                .map(|t| t.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let published = entry
                .published
                .or(entry.updated)
                .map(|d| d.to_rfc2822())
                .unwrap_or_default();
            let filter_id = entry
                .categories
                .iter()
                .map(|c| c.term.as_str())
                .collect::<Vec<_>>()
                .join(", ");

            FeedItem::new(title, link, entry.id)
                .with_description(strip_html(&description))
                .with_published(published)
                .with_filter_id(filter_id)
        })
        .collect();

    Ok(FetchedFeed {
        title,
        items,
        fetched_at,
    })
}

/// Strip HTML tags and decode the common entities, leaving plain text
/// suitable for email template data.
fn strip_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => output.push(ch),
            _ => {}
        }
    }
    let output = output
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    output.trim().to_string()
}
