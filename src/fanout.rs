//! Notification fan-out for feedrelay.
//!
//! Two algorithms, selected by frequency mode. Instant mode sends one
//! multi-recipient email per article; digest mode sends one shared
//! full-batch email to "all" subscribers plus one individually
//! addressed email per partial-match subscriber. Both count successful
//! notifications only and keep going past per-send failures.

use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::feed::{Feed, FeedItem};
use crate::filter::{FilterIndex, FilterValue};
use crate::platform::{Platform, Recipients, Subscriber, Template, TransactionalSend};
use crate::schedule::Frequency;
use crate::subscription::active_filter;

/// Content type used for all notification emails.
pub const CONTENT_TYPE: &str = "html";

/// A subscriber with their decoded filter for one frequency.
#[derive(Debug, Clone)]
enum Audience {
    /// Whole-filter "all": receives everything unconditionally.
    All(String),
    /// Structured filter, expanded once for the whole batch.
    Filtered(String, FilterIndex),
}

impl Audience {
    fn email(&self) -> &str {
        match self {
            Audience::All(email) | Audience::Filtered(email, _) => email,
        }
    }
}

/// Decode subscriber filters for a feed and frequency.
///
/// Subscribers whose stored filter is absent, empty, or undecodable are
/// excluded with a log line.
fn decode_audience(
    subscribers: &[Subscriber],
    url_hash: &str,
    frequency: Frequency,
) -> Vec<Audience> {
    let mut audience = Vec::with_capacity(subscribers.len());
    for subscriber in subscribers {
        match active_filter(&subscriber.attribs, url_hash, frequency) {
            Some(FilterValue::All) => audience.push(Audience::All(subscriber.email.clone())),
            Some(filter) => {
                audience.push(Audience::Filtered(subscriber.email.clone(), filter.expand()))
            }
            None => {
                debug!(email = %subscriber.email, frequency = %frequency,
                    "subscriber has no usable filter, skipping");
            }
        }
    }
    audience
}

/// Render one article into template data, resolving relative links
/// against the feed's email base URL.
fn article_payload(feed: &Feed, article: &FeedItem) -> Value {
    let link = resolve_link(&article.link, feed.email_base_url.as_deref());
    json!({
        "title": article.title,
        "link": link,
        "description": article.description,
        "published": article.published,
        "guid": article.guid,
    })
}

/// Resolve an article link against the feed's email base URL. Links
/// that already parse as absolute URLs pass through; anything else is
/// joined onto the base. Without a usable base the link passes through
/// unchanged.
fn resolve_link(link: &str, email_base: Option<&str>) -> String {
    if Url::parse(link).is_ok() {
        return link.to_string();
    }
    let joined = email_base
        .and_then(|base| Url::parse(base).ok())
        .and_then(|base| base.join(link).ok());
    match joined {
        Some(url) => url.to_string(),
        None => link.to_string(),
    }
}

/// Per-article fan-out for instant mode.
///
/// Articles are dispatched oldest first (the new-article prefix is
/// newest first). Returns the total notification count: the sum of
/// recipient-set sizes over all successfully sent articles.
pub async fn fan_out_instant<P: Platform>(
    platform: &P,
    from_email: &str,
    feed: &Feed,
    template: &Template,
    articles: &[FeedItem],
    subscribers: &[Subscriber],
) -> usize {
    let audience = decode_audience(subscribers, &feed.url_hash(), Frequency::Instant);
    let mut notified = 0;

    for article in articles.iter().rev() {
        let tokens = article.filter_tokens();
        let recipients: Vec<String> = audience
            .iter()
            .filter(|entry| match entry {
                Audience::All(_) => true,
                Audience::Filtered(_, index) => index.matches(&tokens),
            })
            .map(|entry| entry.email().to_string())
            .collect();

        let recipients = Recipients::Many(recipients);
        // Never issue an empty send
        if recipients.is_empty() {
            debug!(guid = %article.guid, "no matching recipients for article");
            continue;
        }

        let recipient_count = recipients.len();
        let send = TransactionalSend {
            from_email: from_email.to_string(),
            template_id: template.id.clone(),
            content_type: CONTENT_TYPE.to_string(),
            recipients,
            data: json!({
                "feed": feed.name,
                "article": article_payload(feed, article),
            }),
            subject_override: Some(article.title.clone()),
        };
        match platform.send_transactional(&send).await {
            Ok(()) => notified += recipient_count,
            Err(e) => {
                warn!(feed = %feed.name, guid = %article.guid, error = %e,
                    "article send failed, continuing");
            }
        }
    }
    notified
}

/// Per-subscriber fan-out for digest mode (daily/weekly).
///
/// Whole-"all" subscribers are pooled into one shared full-batch send;
/// partial matchers each get one individually addressed digest with
/// only their matched articles. Returns (shared-list size) + (count of
/// individual sends), successes only.
pub async fn fan_out_digest<P: Platform>(
    platform: &P,
    from_email: &str,
    feed: &Feed,
    frequency: Frequency,
    template: &Template,
    articles: &[FeedItem],
    subscribers: &[Subscriber],
) -> usize {
    let audience = decode_audience(subscribers, &feed.url_hash(), frequency);

    // Chronological order for digest bodies
    let batch: Vec<&FeedItem> = articles.iter().rev().collect();

    let mut full_digest: Vec<String> = Vec::new();
    let mut partial: Vec<(String, Vec<&FeedItem>)> = Vec::new();
    for entry in &audience {
        match entry {
            Audience::All(email) => full_digest.push(email.clone()),
            Audience::Filtered(email, index) => {
                let matched: Vec<&FeedItem> = batch
                    .iter()
                    .filter(|article| index.matches(&article.filter_tokens()))
                    .copied()
                    .collect();
                // A subscriber with zero matches receives nothing
                if !matched.is_empty() {
                    partial.push((email.clone(), matched));
                }
            }
        }
    }

    let mut notified = 0;

    if !full_digest.is_empty() {
        let recipient_count = full_digest.len();
        let send = digest_send(platform_data(feed, &batch), from_email, template, Recipients::Many(full_digest));
        match platform.send_transactional(&send).await {
            Ok(()) => notified += recipient_count,
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "shared digest send failed, continuing");
            }
        }
    }

    for (email, matched) in partial {
        let send = digest_send(platform_data(feed, &matched), from_email, template, Recipients::One(email.clone()));
        match platform.send_transactional(&send).await {
            Ok(()) => notified += 1,
            Err(e) => {
                warn!(feed = %feed.name, email = %email, error = %e,
                    "digest send failed, continuing");
            }
        }
    }
    notified
}

fn platform_data(feed: &Feed, articles: &[&FeedItem]) -> Value {
    let rendered: Vec<Value> = articles
        .iter()
        .map(|article| article_payload(feed, article))
        .collect();
    json!({
        "feed": feed.name,
        "articles": rendered,
    })
}

fn digest_send(
    data: Value,
    from_email: &str,
    template: &Template,
    recipients: Recipients,
) -> TransactionalSend {
    TransactionalSend {
        from_email: from_email.to_string(),
        template_id: template.id.clone(),
        content_type: CONTENT_TYPE.to_string(),
        recipients,
        data,
        subject_override: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ListUpdate, MailingList};
    use crate::Result;
    use std::sync::Mutex;

    /// Platform fake that records sends and optionally fails some.
    struct RecordingPlatform {
        sends: Mutex<Vec<TransactionalSend>>,
        fail_guids: Vec<String>,
    }

    impl RecordingPlatform {
        fn new() -> Self {
            Self {
                sends: Mutex::new(Vec::new()),
                fail_guids: Vec::new(),
            }
        }

        fn failing_on(guid: &str) -> Self {
            Self {
                sends: Mutex::new(Vec::new()),
                fail_guids: vec![guid.to_string()],
            }
        }

        fn sends(&self) -> Vec<TransactionalSend> {
            self.sends.lock().unwrap().clone()
        }
    }

    impl Platform for RecordingPlatform {
        async fn all_lists(&self) -> Result<Vec<MailingList>> {
            Ok(Vec::new())
        }

        async fn get_list(&self, id: &str) -> Result<MailingList> {
            Err(crate::RelayError::NotFound(id.to_string()))
        }

        async fn update_list(&self, _id: &str, _update: &ListUpdate) -> Result<()> {
            Ok(())
        }

        async fn list_subscribers(&self, _list_id: &str) -> Result<Vec<Subscriber>> {
            Ok(Vec::new())
        }

        async fn find_template(&self, _name: &str) -> Result<Option<Template>> {
            Ok(None)
        }

        async fn send_transactional(&self, send: &TransactionalSend) -> Result<()> {
            let guid = send.data["article"]["guid"].as_str().unwrap_or_default();
            if self.fail_guids.iter().any(|g| g == guid) {
                return Err(crate::RelayError::Platform("boom".to_string()));
            }
            self.sends.lock().unwrap().push(send.clone());
            Ok(())
        }
    }

    fn template() -> Template {
        Template {
            id: "tpl-1".to_string(),
            name: "newsletter-instant".to_string(),
        }
    }

    fn feed() -> Feed {
        Feed::new("list-1", "News", "https://example.com/feed.xml")
            .with_frequency(Frequency::Instant)
    }

    fn subscriber(email: &str, filter: Value) -> Subscriber {
        let hash = feed().url_hash();
        Subscriber {
            email: email.to_string(),
            attribs: json!({hash: {"filter": {"instant": filter.clone(), "daily": filter}}}),
        }
    }

    fn recipient_emails(send: &TransactionalSend) -> Vec<String> {
        match &send.recipients {
            Recipients::One(email) => vec![email.clone()],
            Recipients::Many(emails) => emails.clone(),
        }
    }

    #[tokio::test]
    async fn test_instant_fanout_scenario() {
        // 2 new articles (newest first), 3 subscribers:
        // A = "all", B matches only the older article, C matches neither
        let articles = vec![
            FeedItem::new("Newer", "https://example.com/2", "a0").with_filter_id("other 9"),
            FeedItem::new("Older", "https://example.com/1", "a1").with_filter_id("region 5"),
        ];
        let subscribers = vec![
            subscriber("a@example.com", json!("all")),
            subscriber("b@example.com", json!({"region": ["5"]})),
            subscriber("c@example.com", json!({"minister": ["9"]})),
        ];

        let platform = RecordingPlatform::new();
        let notified = fan_out_instant(
            &platform,
            "from@example.com",
            &feed(),
            &template(),
            &articles,
            &subscribers,
        )
        .await;

        assert_eq!(notified, 3);
        let sends = platform.sends();
        assert_eq!(sends.len(), 2);
        // Oldest article first
        assert_eq!(sends[0].data["article"]["guid"], "a1");
        assert_eq!(
            recipient_emails(&sends[0]),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert_eq!(sends[1].data["article"]["guid"], "a0");
        assert_eq!(recipient_emails(&sends[1]), vec!["a@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_instant_no_empty_sends() {
        let articles =
            vec![FeedItem::new("Title", "https://example.com/1", "a0").with_filter_id("region 5")];
        let subscribers = vec![subscriber("c@example.com", json!({"minister": ["9"]}))];

        let platform = RecordingPlatform::new();
        let notified = fan_out_instant(
            &platform,
            "from@example.com",
            &feed(),
            &template(),
            &articles,
            &subscribers,
        )
        .await;

        assert_eq!(notified, 0);
        assert!(platform.sends().is_empty());
    }

    #[tokio::test]
    async fn test_instant_send_failure_does_not_stop_batch() {
        let articles = vec![
            FeedItem::new("Newer", "https://example.com/2", "a0").with_filter_id("region 5"),
            FeedItem::new("Older", "https://example.com/1", "a1").with_filter_id("region 5"),
        ];
        let subscribers = vec![subscriber("a@example.com", json!("all"))];

        // The older article (sent first) fails; the newer still goes out
        let platform = RecordingPlatform::failing_on("a1");
        let notified = fan_out_instant(
            &platform,
            "from@example.com",
            &feed(),
            &template(),
            &articles,
            &subscribers,
        )
        .await;

        assert_eq!(notified, 1);
        let sends = platform.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].data["article"]["guid"], "a0");
    }

    #[tokio::test]
    async fn test_digest_fanout_scenario() {
        // 3 new articles, 2 subscribers: A = "all" (shared digest),
        // B matches only one article
        let articles = vec![
            FeedItem::new("Third", "https://example.com/3", "a0").with_filter_id("other 1"),
            FeedItem::new("Second", "https://example.com/2", "a1").with_filter_id("region 5"),
            FeedItem::new("First", "https://example.com/1", "a2").with_filter_id("other 2"),
        ];
        let subscribers = vec![
            subscriber("a@example.com", json!("all")),
            subscriber("b@example.com", json!({"region": ["5"]})),
        ];

        let platform = RecordingPlatform::new();
        let notified = fan_out_digest(
            &platform,
            "from@example.com",
            &feed(),
            Frequency::Daily,
            &template(),
            &articles,
            &subscribers,
        )
        .await;

        assert_eq!(notified, 2);
        let sends = platform.sends();
        assert_eq!(sends.len(), 2);

        // Shared full digest: all three articles, chronological order
        assert_eq!(recipient_emails(&sends[0]), vec!["a@example.com".to_string()]);
        let full_articles = sends[0].data["articles"].as_array().unwrap();
        assert_eq!(full_articles.len(), 3);
        assert_eq!(full_articles[0]["guid"], "a2");
        assert_eq!(full_articles[2]["guid"], "a0");

        // Individual partial digest: only the matched article
        assert_eq!(recipient_emails(&sends[1]), vec!["b@example.com".to_string()]);
        let partial_articles = sends[1].data["articles"].as_array().unwrap();
        assert_eq!(partial_articles.len(), 1);
        assert_eq!(partial_articles[0]["guid"], "a1");
    }

    #[tokio::test]
    async fn test_digest_zero_match_subscriber_gets_nothing() {
        let articles =
            vec![FeedItem::new("Title", "https://example.com/1", "a0").with_filter_id("other 1")];
        let subscribers = vec![subscriber("b@example.com", json!({"region": ["5"]}))];

        let platform = RecordingPlatform::new();
        let notified = fan_out_digest(
            &platform,
            "from@example.com",
            &feed(),
            Frequency::Daily,
            &template(),
            &articles,
            &subscribers,
        )
        .await;

        assert_eq!(notified, 0);
        assert!(platform.sends().is_empty());
    }

    #[tokio::test]
    async fn test_subscriber_without_filter_is_skipped() {
        let articles =
            vec![FeedItem::new("Title", "https://example.com/1", "a0").with_filter_id("region 5")];
        let subscribers = vec![
            Subscriber {
                email: "nofilter@example.com".to_string(),
                attribs: Value::Null,
            },
            subscriber("a@example.com", json!("all")),
        ];

        let platform = RecordingPlatform::new();
        let notified = fan_out_instant(
            &platform,
            "from@example.com",
            &feed(),
            &template(),
            &articles,
            &subscribers,
        )
        .await;

        assert_eq!(notified, 1);
        let sends = platform.sends();
        assert_eq!(recipient_emails(&sends[0]), vec!["a@example.com".to_string()]);
    }

    #[test]
    fn test_article_payload_resolves_relative_links() {
        let feed = feed().with_email_base_url("https://news.example.com/");
        let article = FeedItem::new("Title", "/articles/1", "a0");
        let payload = article_payload(&feed, &article);
        assert_eq!(payload["link"], "https://news.example.com/articles/1");

        // Absolute links pass through
        let article = FeedItem::new("Title", "https://other.example.com/1", "a1");
        let payload = article_payload(&feed, &article);
        assert_eq!(payload["link"], "https://other.example.com/1");
    }

    #[test]
    fn test_resolve_link_uses_url_semantics() {
        let base = Some("https://news.example.com/");
        // A path that merely starts with "http" is still relative
        assert_eq!(
            resolve_link("httpdocs/x", base),
            "https://news.example.com/httpdocs/x"
        );
        assert_eq!(
            resolve_link("https://other.example.com/1", base),
            "https://other.example.com/1"
        );
        // No usable base: pass through unchanged
        assert_eq!(resolve_link("articles/1", None), "articles/1");
        assert_eq!(resolve_link("articles/1", Some("not a url")), "articles/1");
    }
}
