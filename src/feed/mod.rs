//! Podcast feed retrieval and parsing.
//!
//! - [`parser`] turns RSS/Atom bytes into a [`FeedDocument`] using `feed-rs`
//! - [`fetcher`] provides [`HttpFeedSource`], the production [`FeedSource`]
//!
//! The feed worker only sees the [`FeedSource`] trait, so tests can hand it
//! canned documents without a network.

mod fetcher;
mod parser;

use async_trait::async_trait;

pub use fetcher::{FetchError, HttpFeedSource};
pub use parser::{parse_feed, FeedDocument};

/// Something that can turn a feed URL into a parsed document.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FeedDocument, FetchError>;
}
