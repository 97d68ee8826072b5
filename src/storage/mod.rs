//! SQLite persistence for podcasts, episodes, articles and job queues.
//!
//! [`Database`] is the concrete entity store and job queue backend. The
//! pipeline never calls it directly; it goes through the
//! [`EntityStore`](crate::services::EntityStore) and
//! [`JobQueue`](crate::queue::JobQueue) traits so tests can substitute doubles.

mod articles;
mod enrichment;
mod episodes;
mod jobs;
mod podcasts;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    Article, DatabaseError, Enclosure, EnrichmentTarget, EntityKind, Episode, EpisodeUpsert,
    NewPodcast, Podcast, QueueStats, RawEpisode, UpsertOutcome,
};
