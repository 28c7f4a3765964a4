//! Tag-string codec for per-feed state stored on the external platform.
//!
//! The platform only offers a flat list of tag strings per mailing
//! list, used here as a makeshift key-value store. All prefix parsing
//! lives in this one canonical encode/decode pair; the rest of the
//! system works with the typed [`FeedState`].
//!
//! Tag formats:
//! - `last-poll:<frequency>:<ISO-8601 timestamp>`
//! - `last-seen:<frequency>:<article GUID>`
//! - `freq:<frequency>`
//! - `url:<sha256 hex of feed URL>`
//! - `email-base:<base URL for article links>`
//! - `topic-group:<name>`

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::schedule::Frequency;

/// Prefix for poll-time tags.
pub const LAST_POLL_PREFIX: &str = "last-poll";

/// Prefix for watermark tags.
pub const LAST_SEEN_PREFIX: &str = "last-seen";

/// Prefix for frequency membership tags.
pub const FREQ_PREFIX: &str = "freq";

/// Prefix for the feed identity hash tag.
pub const URL_HASH_PREFIX: &str = "url";

/// Prefix for the email base URL tag.
pub const EMAIL_BASE_PREFIX: &str = "email-base";

/// Prefix for the topic group tag.
pub const TOPIC_GROUP_PREFIX: &str = "topic-group";

/// Typed view of a feed list's state tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    /// Last successful poll time per frequency.
    pub last_poll: BTreeMap<Frequency, DateTime<Utc>>,
    /// Watermark (last-seen article GUID) per frequency.
    pub last_seen: BTreeMap<Frequency, String>,
    /// Frequency memberships.
    pub frequencies: BTreeSet<Frequency>,
    /// Feed URL identity hash.
    pub url_hash: Option<String>,
    /// Base URL used for article link generation in emails.
    pub email_base: Option<String>,
    /// Topic group name.
    pub topic_group: Option<String>,
    /// Tags that are none of ours, preserved verbatim. Includes
    /// `freq:` tags naming frequencies this build does not know;
    /// those feeds keep their configuration but are never polled.
    pub extra: Vec<String>,
}

impl FeedState {
    /// Decode a list's tags into typed state.
    ///
    /// Later duplicates win for `last-poll`/`last-seen`. State tags
    /// with a known prefix that fail to parse are stale leftovers from
    /// older formats and are dropped.
    pub fn decode(tags: &[String]) -> FeedState {
        let mut state = FeedState::default();
        for tag in tags {
            let mut parts = tag.splitn(3, ':');
            let prefix = parts.next().unwrap_or_default();
            match prefix {
                LAST_POLL_PREFIX => {
                    let freq = parts.next().and_then(Frequency::from_name);
                    let time = parts
                        .next()
                        .and_then(|value| DateTime::parse_from_rfc3339(value).ok());
                    if let (Some(freq), Some(time)) = (freq, time) {
                        state.last_poll.insert(freq, time.with_timezone(&Utc));
                    }
                }
                LAST_SEEN_PREFIX => {
                    let freq = parts.next().and_then(Frequency::from_name);
                    if let (Some(freq), Some(guid)) = (freq, parts.next()) {
                        if !guid.is_empty() {
                            state.last_seen.insert(freq, guid.to_string());
                        }
                    }
                }
                FREQ_PREFIX => match parts.next().and_then(Frequency::from_name) {
                    Some(freq) => {
                        state.frequencies.insert(freq);
                    }
                    // Unknown frequency: keep the configuration, never poll it
                    None => state.extra.push(tag.clone()),
                },
                URL_HASH_PREFIX => {
                    if let Some(hash) = parts.next() {
                        state.url_hash = Some(hash.to_string());
                    }
                }
                EMAIL_BASE_PREFIX => {
                    // The base URL itself may contain ':'
                    if let Some(start) = tag.find(':') {
                        state.email_base = Some(tag[start + 1..].to_string());
                    }
                }
                TOPIC_GROUP_PREFIX => {
                    if let Some(group) = parts.next() {
                        state.topic_group = Some(group.to_string());
                    }
                }
                _ => state.extra.push(tag.clone()),
            }
        }
        state
    }

    /// Encode back to the platform tag format.
    ///
    /// Emits exactly one `last-poll` and at most one `last-seen` tag
    /// per frequency; stale duplicates present in the decoded input do
    /// not survive a round-trip.
    pub fn encode(&self) -> Vec<String> {
        let mut tags = Vec::new();
        if let Some(hash) = &self.url_hash {
            tags.push(format!("{URL_HASH_PREFIX}:{hash}"));
        }
        if let Some(base) = &self.email_base {
            tags.push(format!("{EMAIL_BASE_PREFIX}:{base}"));
        }
        if let Some(group) = &self.topic_group {
            tags.push(format!("{TOPIC_GROUP_PREFIX}:{group}"));
        }
        for freq in &self.frequencies {
            tags.push(format!("{FREQ_PREFIX}:{}", freq.name()));
        }
        for (freq, time) in &self.last_poll {
            tags.push(format!(
                "{LAST_POLL_PREFIX}:{}:{}",
                freq.name(),
                time.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        for (freq, guid) in &self.last_seen {
            tags.push(format!("{LAST_SEEN_PREFIX}:{}:{guid}", freq.name()));
        }
        tags.extend(self.extra.iter().cloned());
        tags
    }

    /// Last poll time for a frequency.
    pub fn poll_time(&self, frequency: Frequency) -> Option<DateTime<Utc>> {
        self.last_poll.get(&frequency).copied()
    }

    /// Watermark for a frequency.
    pub fn watermark(&self, frequency: Frequency) -> Option<&str> {
        self.last_seen.get(&frequency).map(String::as_str)
    }

    /// Record a poll time.
    pub fn record_poll(&mut self, frequency: Frequency, time: DateTime<Utc>) {
        self.last_poll.insert(frequency, time);
    }

    /// Record a watermark.
    pub fn record_watermark(&mut self, frequency: Frequency, guid: impl Into<String>) {
        self.last_seen.insert(frequency, guid.into());
    }
}
