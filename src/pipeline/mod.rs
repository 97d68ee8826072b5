//! The ingestion pipeline proper.
//!
//! - [`Reconciler`] merges a parsed feed into stored episodes
//! - [`FanOut`] pushes newly created episodes to search, the enrichment
//!   queue and the activity feed
//! - [`FeedFetchConsumer`] and [`ImageEnrichmentConsumer`] are the two queue
//!   handlers
//! - [`enqueue_due_podcasts`] is the periodic trigger that feeds the first queue

mod conductor;
mod enrich_worker;
mod fanout;
mod feed_worker;
mod reconcile;

pub use conductor::{enqueue_due_podcasts, FEED_JOB_OPTIONS};
pub use enrich_worker::{EnrichOutcome, ImageEnrichmentConsumer, SkipReason};
pub use fanout::{FanOut, FanOutReport, DEFAULT_ACTIVITY_BATCH};
pub use feed_worker::{FeedFetchConsumer, FeedReport};
pub use reconcile::{ReconcileReport, Reconciler};
