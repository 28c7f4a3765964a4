//! feedrelay - an RSS-to-email newsletter bridge.
//!
//! Polls registered RSS/Atom feeds on per-frequency schedules, detects
//! new articles with a per-(feed, frequency) watermark, and fans out
//! notifications through an external email/list platform, honoring
//! each subscriber's topic filter. The platform doubles as the data
//! store: feed registry and polling state live in mailing-list tags,
//! subscriber filters in attribute blobs.

pub mod config;
pub mod error;
pub mod fanout;
pub mod feed;
pub mod filter;
pub mod logging;
pub mod platform;
pub mod processor;
pub mod schedule;
pub mod subscription;
pub mod watermark;

pub use config::Config;
pub use error::{RelayError, Result};
pub use processor::FeedProcessor;
pub use schedule::Frequency;
