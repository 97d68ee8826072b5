//! Queue-driven podcast ingestion.
//!
//! Two independent workers share one SQLite store:
//!
//! - the feed worker drains the `podcast` queue, reconciling each podcast's
//!   feed into episodes and fanning new episodes out to search, the activity
//!   feed and the `og` queue
//! - the enrichment worker drains the `og` queue, scraping a preview image
//!   for an article, episode or podcast and storing it once
//!
//! Both tolerate at-least-once delivery: replaying a job never duplicates a
//! side effect.

pub mod config;
pub mod feed;
pub mod pipeline;
pub mod queue;
pub mod scrape;
pub mod services;
pub mod storage;
pub mod util;
