//! Subscriber filter lifecycle for feedrelay.
//!
//! Per-subscriber filter preferences live in the platform's attribute
//! blob, keyed by feed URL hash:
//!
//! ```text
//! attribs[url_hash]["filter"][frequency]  active filter value
//! attribs[url_hash]["pending"][token]     unconfirmed filter + expiry
//! attribs[url_hash]["revoke"][frequency]  revocation token
//! ```
//!
//! A pending filter is keyed by a random token and expires after 24
//! hours; confirmation promotes it to the active slot and assigns a
//! long-lived revocation token. Expired pending entries are ignored by
//! reads and dropped lazily on the next write.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::filter::FilterValue;
use crate::schedule::Frequency;
use crate::{RelayError, Result};

/// Pending filter lifetime in hours.
pub const PENDING_TTL_HOURS: i64 = 24;

/// Result of confirming a pending filter.
#[derive(Debug, Clone)]
pub struct Confirmation {
    /// Frequency the filter now applies to.
    pub frequency: Frequency,
    /// Token that can later revoke the subscription.
    pub revocation_token: String,
}

/// The subscriber's active filter for a feed and frequency.
///
/// Absent, empty-string, or undecodable filters all yield `None`;
/// such subscribers are excluded from fan-out with a log line, never
/// an error.
pub fn active_filter(attribs: &Value, url_hash: &str, frequency: Frequency) -> Option<FilterValue> {
    let value = attribs.get(url_hash)?.get("filter")?.get(frequency.name())?;
    if let Value::String(s) = value {
        if s.is_empty() {
            return None;
        }
    }
    match FilterValue::from_json(value) {
        Ok(filter) => Some(filter),
        Err(e) => {
            warn!(url_hash, frequency = %frequency, error = %e, "undecodable subscriber filter");
            None
        }
    }
}

/// Create a pending filter entry for one frequency.
///
/// Exactly one frequency is permitted per entry; a subscriber holds
/// independent filters per frequency, each set via a separate call.
/// Returns the confirmation token.
pub fn create_pending(
    attribs: &mut Value,
    url_hash: &str,
    frequency: Frequency,
    filter: &Value,
    now: DateTime<Utc>,
) -> Result<String> {
    // Validate the filter shape up front
    FilterValue::from_json(filter)?;

    let feed = ensure_object(ensure_entry(attribs, url_hash));
    let pending = ensure_object(
        feed.entry("pending".to_string())
            .or_insert_with(|| Value::Object(Map::new())),
    );
    prune_expired(pending, now);

    let token = Uuid::new_v4().to_string();
    pending.insert(
        token.clone(),
        json!({
            "frequency": frequency.name(),
            "filter": filter,
            "expires_at": (now + Duration::hours(PENDING_TTL_HOURS)).to_rfc3339(),
        }),
    );
    Ok(token)
}

/// Confirm a pending filter, promoting it to the active slot.
///
/// Expired entries are treated as missing. Assigns and returns a
/// revocation token alongside the affected frequency.
pub fn confirm_pending(
    attribs: &mut Value,
    url_hash: &str,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Confirmation> {
    let feed = attribs
        .get_mut(url_hash)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| RelayError::NotFound("pending subscription".to_string()))?;

    let pending = feed
        .get_mut("pending")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| RelayError::NotFound("pending subscription".to_string()))?;
    prune_expired(pending, now);

    let entry = pending
        .remove(token)
        .ok_or_else(|| RelayError::NotFound("pending subscription".to_string()))?;

    let frequency = entry
        .get("frequency")
        .and_then(Value::as_str)
        .and_then(Frequency::from_name)
        .ok_or_else(|| {
            RelayError::Validation("pending entry has no valid frequency".to_string())
        })?;
    let filter = entry
        .get("filter")
        .cloned()
        .ok_or_else(|| RelayError::Validation("pending entry has no filter".to_string()))?;

    let filters = ensure_object(
        feed.entry("filter".to_string())
            .or_insert_with(|| Value::Object(Map::new())),
    );
    filters.insert(frequency.name().to_string(), filter);

    let revocation_token = Uuid::new_v4().to_string();
    let revoke = ensure_object(
        feed.entry("revoke".to_string())
            .or_insert_with(|| Value::Object(Map::new())),
    );
    revoke.insert(
        frequency.name().to_string(),
        Value::String(revocation_token.clone()),
    );

    Ok(Confirmation {
        frequency,
        revocation_token,
    })
}

/// Revoke an active filter by its revocation token.
///
/// Returns the frequency whose filter was removed.
pub fn revoke(attribs: &mut Value, url_hash: &str, token: &str) -> Result<Frequency> {
    let feed = attribs
        .get_mut(url_hash)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| RelayError::NotFound("subscription".to_string()))?;

    let frequency = feed
        .get("revoke")
        .and_then(Value::as_object)
        .and_then(|revoke| {
            revoke.iter().find_map(|(freq, value)| {
                (value.as_str() == Some(token))
                    .then(|| Frequency::from_name(freq))
                    .flatten()
            })
        })
        .ok_or_else(|| RelayError::NotFound("subscription".to_string()))?;

    if let Some(filters) = feed.get_mut("filter").and_then(Value::as_object_mut) {
        filters.remove(frequency.name());
    }
    if let Some(revoke) = feed.get_mut("revoke").and_then(Value::as_object_mut) {
        revoke.remove(frequency.name());
    }
    Ok(frequency)
}

/// Drop expired pending entries (lazy cleanup on write).
fn prune_expired(pending: &mut Map<String, Value>, now: DateTime<Utc>) {
    pending.retain(|_, entry| {
        entry
            .get("expires_at")
            .and_then(Value::as_str)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .is_some_and(|expires| now < expires.with_timezone(&Utc))
    });
}

fn ensure_entry<'a>(parent: &'a mut Value, key: &str) -> &'a mut Value {
    if !parent.is_object() {
        *parent = Value::Object(Map::new());
    }
    ensure_object(parent)
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut().expect("value was just made an object")
}
