//! Watermark tracking for feedrelay.
//!
//! A watermark is the GUID of the most recently processed article for a
//! (feed, frequency) pair. Upstream feeds list articles newest first, so
//! the "new" articles are exactly the prefix of the current list up to
//! (but excluding) the article matching the watermark.

use crate::feed::FeedItem;

/// Compute the articles produced since the stored watermark.
///
/// Returns the prefix of `articles` strictly before the first element
/// whose GUID equals `watermark`. With no watermark every article is
/// new. When the watermark GUID is not found (feed truncated or
/// rotated) the whole list is returned: duplicates are preferred over
/// silent loss.
pub fn find_new_articles<'a>(articles: &'a [FeedItem], watermark: Option<&str>) -> &'a [FeedItem] {
    if articles.is_empty() {
        return articles;
    }
    let Some(watermark) = watermark else {
        return articles;
    };
    match articles.iter().position(|item| item.guid == watermark) {
        Some(index) => &articles[..index],
        None => articles,
    }
}

/// The watermark to persist after processing `articles`: the GUID of
/// the newest (first) element. `None` when the list is empty, in which
/// case the stored watermark is left unchanged.
pub fn next_watermark(articles: &[FeedItem]) -> Option<&str> {
    articles.first().map(|item| item.guid.as_str())
}
