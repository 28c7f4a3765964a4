//! External email/list platform boundary for feedrelay.
//!
//! The platform stores mailing lists (the feed registry), subscribers,
//! templates, and provides the transactional send primitive. Everything
//! behind this seam is an external collaborator; the core only depends
//! on the [`Platform`] trait.

pub mod client;
pub mod tags;
pub mod types;

pub use client::HttpPlatform;
pub use tags::FeedState;
pub use types::{ListUpdate, MailingList, Recipients, Subscriber, Template, TransactionalSend};

use crate::Result;

/// Operations the core consumes from the external platform.
#[allow(async_fn_in_trait)]
pub trait Platform {
    /// Enumerate all mailing lists.
    async fn all_lists(&self) -> Result<Vec<MailingList>>;

    /// Fetch a single list by id.
    async fn get_list(&self, id: &str) -> Result<MailingList>;

    /// Overwrite a list's tags and description (last-write-wins).
    async fn update_list(&self, id: &str, update: &ListUpdate) -> Result<()>;

    /// Enumerate subscribers of a list.
    async fn list_subscribers(&self, list_id: &str) -> Result<Vec<Subscriber>>;

    /// Look up a transactional template by name.
    async fn find_template(&self, name: &str) -> Result<Option<Template>>;

    /// Dispatch a transactional email. At-least-once; a successful
    /// return only acknowledges acceptance.
    async fn send_transactional(&self, send: &TransactionalSend) -> Result<()>;
}
