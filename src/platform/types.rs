//! Data shapes exchanged with the external email/list platform.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mailing list on the external platform.
///
/// Lists double as the feed registry: the list description holds the
/// canonical feed URL and the tags hold frequency memberships, identity
/// hashes, and per-frequency poll state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailingList {
    /// Platform-assigned list identifier.
    pub id: String,
    /// List display name.
    pub name: String,
    /// Tag strings (see `platform::tags` for the state tag format).
    #[serde(default)]
    pub tags: Vec<String>,
    /// List description; stores the canonical feed URL.
    #[serde(default)]
    pub description: String,
}

/// Fields written back when updating a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUpdate {
    /// Replacement tag set.
    pub tags: Vec<String>,
    /// Replacement description.
    pub description: String,
}

/// A subscriber of a mailing list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    /// Subscriber email address.
    pub email: String,
    /// Opaque attribute blob; holds per-feed filter preferences keyed
    /// by feed URL hash (see `subscription`).
    #[serde(default)]
    pub attribs: Value,
}

/// A transactional email template stored on the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Platform-assigned template identifier.
    pub id: String,
    /// Template name; looked up as "{prefix}-{frequency}".
    pub name: String,
}

/// Recipients of a transactional send: a single address or a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    /// One individually-addressed recipient.
    One(String),
    /// A multi-recipient batch send.
    Many(Vec<String>),
}

impl Recipients {
    /// Number of addressed recipients.
    pub fn len(&self) -> usize {
        match self {
            Recipients::One(_) => 1,
            Recipients::Many(emails) => emails.len(),
        }
    }

    /// Whether no recipient is addressed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A transactional email send request.
///
/// Delivery is at-least-once; the core only observes the synchronous
/// acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionalSend {
    /// Sender address.
    pub from_email: String,
    /// Template to render.
    pub template_id: String,
    /// Content type ("html" or "plain").
    pub content_type: String,
    /// Recipient or recipients.
    pub recipients: Recipients,
    /// Template data (articles, feed metadata).
    pub data: Value,
    /// Optional subject line override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_override: Option<String>,
}
