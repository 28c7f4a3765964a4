//! Feed processing orchestration.
//!
//! One processing pass covers a single (feed, frequency) pair: gate on
//! the schedule, fetch, classify new articles against the watermark,
//! fan out notifications, then persist the advanced state. State writes
//! re-read the list tags immediately beforehand so concurrent passes
//! for other frequencies lose at most their own slot (last-write-wins
//! per frequency, not per tag set).

use std::collections::HashMap;

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::config::{Config, ScheduleConfig};
use crate::fanout::{fan_out_digest, fan_out_instant};
use crate::feed::{Feed, FeedSource, MAX_ITEMS_PER_FEED};
use crate::platform::{FeedState, ListUpdate, Platform};
use crate::schedule::{should_poll, Frequency};
use crate::watermark::{find_new_articles, next_watermark};
use crate::{RelayError, Result};

/// Orchestrates polling, watermarking, and fan-out over a feed source
/// and the external platform.
pub struct FeedProcessor<S, P> {
    source: S,
    platform: P,
    schedule: ScheduleConfig,
    tz: Tz,
    from_email: String,
    template_prefix: String,
}

impl<S: FeedSource, P: Platform> FeedProcessor<S, P> {
    /// Create a processor. Fails when the configured timezone is not a
    /// known IANA name.
    pub fn new(source: S, platform: P, config: &Config) -> Result<Self> {
        let tz: Tz = config
            .schedule
            .timezone
            .parse()
            .map_err(|_| {
                RelayError::Config(format!("unknown timezone: {}", config.schedule.timezone))
            })?;
        Ok(Self {
            source,
            platform,
            schedule: config.schedule.clone(),
            tz,
            from_email: config.platform.from_email.clone(),
            template_prefix: config.platform.template_prefix.clone(),
        })
    }

    /// All registered feeds holding a membership for `frequency`.
    ///
    /// Each mailing list whose tags carry the membership yields one
    /// feed; lists sharing a feed URL are merged into a single logical
    /// feed so no article is fetched or classified twice.
    pub async fn feeds_for_frequency(&self, frequency: Frequency) -> Result<Vec<Feed>> {
        let lists = self.platform.all_lists().await?;
        let mut feeds: Vec<Feed> = Vec::new();

        for list in lists {
            let state = FeedState::decode(&list.tags);
            if !state.frequencies.contains(&frequency) {
                continue;
            }
            // The list description holds the canonical feed URL
            if list.description.is_empty() {
                warn!(list_id = %list.id, "feed list has no URL, skipping");
                continue;
            }
            let mut feed = Feed::new(&list.id, &list.name, &list.description);
            feed.frequencies = state.frequencies;
            feed.email_base_url = state.email_base;
            feed.topic_group = state.topic_group;

            let hash = feed.url_hash();
            match feeds.iter_mut().find(|f| f.url_hash() == hash) {
                Some(existing) => existing.merge(&feed),
                None => feeds.push(feed),
            }
        }
        Ok(feeds)
    }

    /// Process one feed for one frequency.
    ///
    /// Returns (notification count, new article count). A feed that is
    /// not yet due, has no new articles, or is on its baseline first
    /// pass returns (0, 0).
    pub async fn process_feed(&self, feed: &Feed, frequency: Frequency) -> Result<(usize, usize)> {
        let now = Utc::now();
        let list = self.platform.get_list(&feed.list_id).await?;
        let state = FeedState::decode(&list.tags);

        let policy = frequency.policy(&self.schedule);
        if !should_poll(&policy, state.poll_time(frequency), now, self.tz) {
            debug!(feed = %feed.name, frequency = %frequency, "not due");
            return Ok((0, 0));
        }

        let fetched = self.source.fetch(&feed.url).await?;
        let mut items = fetched.items;
        items.truncate(MAX_ITEMS_PER_FEED);

        let watermark = state.watermark(frequency).map(str::to_string);
        if watermark.is_none() {
            // First pass: establish the baseline, notify nothing
            info!(feed = %feed.name, frequency = %frequency, "baseline pass");
            let head = next_watermark(&items).map(str::to_string);
            self.persist(feed, |state| {
                state.record_poll(frequency, now);
                if let Some(guid) = &head {
                    state.record_watermark(frequency, guid.clone());
                }
            })
            .await?;
            return Ok((0, 0));
        }

        let new_articles = find_new_articles(&items, watermark.as_deref());
        if new_articles.is_empty() {
            debug!(feed = %feed.name, frequency = %frequency, "no new articles");
            self.persist(feed, |state| state.record_poll(frequency, now))
                .await?;
            return Ok((0, 0));
        }

        // Resolve the template before mutating any state, so a missing
        // template leaves the watermark untouched for a retry
        let template_name = format!("{}-{}", self.template_prefix, frequency.name());
        let template = self
            .platform
            .find_template(&template_name)
            .await?
            .ok_or(RelayError::TemplateMissing(frequency))?;

        let subscribers = self.platform.list_subscribers(&feed.list_id).await?;
        let notified = if frequency.is_instant() {
            fan_out_instant(
                &self.platform,
                &self.from_email,
                feed,
                &template,
                new_articles,
                &subscribers,
            )
            .await
        } else {
            fan_out_digest(
                &self.platform,
                &self.from_email,
                feed,
                frequency,
                &template,
                new_articles,
                &subscribers,
            )
            .await
        };

        let new_count = new_articles.len();
        let head = next_watermark(&items).map(str::to_string);
        self.persist(feed, |state| {
            state.record_poll(frequency, now);
            if let Some(guid) = &head {
                state.record_watermark(frequency, guid.clone());
            }
        })
        .await?;

        info!(feed = %feed.name, frequency = %frequency, new = new_count, notified,
            "feed processed");
        Ok((notified, new_count))
    }

    /// Process every feed registered for a frequency.
    ///
    /// A failing feed is logged and reported as zero notifications;
    /// it never stops the rest of the batch.
    pub async fn process_feeds_by_frequency(
        &self,
        frequency: Frequency,
    ) -> Result<HashMap<String, usize>> {
        let feeds = self.feeds_for_frequency(frequency).await?;
        let mut results = HashMap::with_capacity(feeds.len());

        for feed in &feeds {
            match self.process_feed(feed, frequency).await {
                Ok((notified, _)) => {
                    results.insert(feed.name.clone(), notified);
                }
                Err(e) => {
                    warn!(feed = %feed.name, frequency = %frequency, error = %e,
                        "feed processing failed");
                    results.insert(feed.name.clone(), 0);
                }
            }
        }
        Ok(results)
    }

    /// Persist a state mutation with a fresh read of the list tags.
    async fn persist<F>(&self, feed: &Feed, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut FeedState),
    {
        let list = self.platform.get_list(&feed.list_id).await?;
        let mut state = FeedState::decode(&list.tags);
        mutate(&mut state);
        let update = ListUpdate {
            tags: state.encode(),
            description: list.description,
        };
        self.platform.update_list(&feed.list_id, &update).await
    }
}
